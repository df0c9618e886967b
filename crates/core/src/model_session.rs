//! The stateful link to the remote model.

use std::fmt::{self, Display};
use std::time::Duration;

use little_chat_model::{ErrorKind, ModelMessage, ModelRequest};
use tokio::select;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::conversation::Transcript;
use crate::model_client::ModelClient;

/// Why a turn produced no reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnFailure {
    /// The provider reported an error.
    Provider { kind: ErrorKind, message: String },
    /// No reply arrived within the allotted time.
    Timeout(Duration),
    /// The caller cancelled the request.
    Cancelled,
}

impl Display for TurnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnFailure::Provider { kind, message } => {
                write!(f, "{kind}: {message}")
            }
            TurnFailure::Timeout(limit) => {
                write!(f, "no reply within {}s", limit.as_secs_f32())
            }
            TurnFailure::Cancelled => write!(f, "request cancelled"),
        }
    }
}

/// Handle to the remote model for one conversation.
///
/// The handle accumulates the context the backend needs for coherent
/// multi-turn replies. The session controller discards it and creates a new
/// one whenever the active transcript is replaced.
pub struct ModelSession {
    client: ModelClient,
    system_prompt: Option<String>,
    history: Vec<ModelMessage>,
}

impl ModelSession {
    /// Creates a handle with no history.
    #[inline]
    pub fn new(client: ModelClient, system_prompt: Option<String>) -> Self {
        Self {
            client,
            system_prompt,
            history: Vec::new(),
        }
    }

    /// Creates a handle whose history mirrors `transcript`.
    pub fn seeded(
        client: ModelClient,
        system_prompt: Option<String>,
        transcript: &Transcript,
    ) -> Self {
        Self {
            client,
            system_prompt,
            history: transcript.to_model_messages(),
        }
    }

    /// The accumulated history, without the system instruction.
    #[inline]
    pub fn history(&self) -> &[ModelMessage] {
        &self.history
    }

    /// Sends `text` as the next user turn and waits for the full reply.
    ///
    /// The user text joins the history whether or not the turn succeeds, so
    /// the context keeps matching the visible non-error transcript. The reply
    /// joins it only on success.
    pub async fn send_turn(
        &mut self,
        text: &str,
        limit: Duration,
        cancel: &CancellationToken,
        on_delta: impl FnMut(&str) + Send + 'static,
    ) -> Result<String, TurnFailure> {
        self.history.push(ModelMessage::User(text.to_owned()));
        let request = self.build_model_request();

        let reply = select! {
            biased;
            _ = cancel.cancelled() => Err(TurnFailure::Cancelled),
            resp = timeout(
                limit,
                self.client.send_request(request, on_delta),
            ) => {
                match resp {
                    Ok(Ok(resp)) => Ok(resp.transcript),
                    Ok(Err(err)) => Err(TurnFailure::Provider {
                        kind: err.kind(),
                        message: err.to_string(),
                    }),
                    Err(_) => Err(TurnFailure::Timeout(limit)),
                }
            }
        };

        if let Ok(reply) = &reply {
            self.history.push(ModelMessage::Assistant(reply.clone()));
        }
        reply
    }

    fn build_model_request(&self) -> ModelRequest {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if let Some(system_prompt) = &self.system_prompt {
            messages.push(ModelMessage::System(system_prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        ModelRequest { messages }
    }
}
