use std::time::Duration;

use little_chat_model::ErrorKind;
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request will fail in the first `failure` attempts.
    /// `Some(0)` means the request will fail infinitely.
    pub failures: Option<u64>,
    /// The kind of the error reported by failed attempts.
    #[serde(skip, default = "default_failure_kind")]
    pub failure_kind: ErrorKind,
    /// Overrides the provider-wide delay before every event of this step.
    #[serde(skip)]
    pub delay: Option<Duration>,
}

fn default_failure_kind() -> ErrorKind {
    ErrorKind::Other
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
            failure_kind: ErrorKind::Other,
            delay: None,
        }
    }

    /// Creates a `PresetResponse` that streams `text` as a single delta.
    #[inline]
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::with_events([PresetEvent::MessageDelta(text.into())])
    }

    /// Creates a `PresetResponse` that always fails with `kind`.
    #[inline]
    pub fn always_failing(kind: ErrorKind) -> Self {
        Self::with_events([]).with_failures(0).with_failure_kind(kind)
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Sets the error kind reported by failed attempts.
    #[inline]
    pub fn with_failure_kind(mut self, kind: ErrorKind) -> Self {
        self.failure_kind = kind;
        self
    }

    /// Sets the delay before every event of this step.
    #[inline]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the full text this response streams on success.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(delta) => delta.as_str(),
            })
            .collect()
    }
}
