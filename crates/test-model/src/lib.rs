//! A local fake model for testing purpose.

mod preset;

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use little_chat_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    delay: Duration,
    event_idx: usize,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if this.event_idx < this.events.len() {
                let event = match &this.events[this.event_idx] {
                    PresetEvent::MessageDelta(msg) => {
                        ModelResponseEvent::MessageDelta(msg.clone())
                    }
                };
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(event)));
            } else if this.event_idx == this.events.len() {
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            } else {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            }
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to a request. The n-th assistant step
/// answers every request whose history carries n user messages, so a failed
/// turn followed by a retry is answered by the next step. If there are no
/// enough steps in the script, an error will be returned.
///
/// Clones share the attempt counters and the request log.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<PresetResponse>,
    delay: Option<Duration>,
    attempts: Arc<Mutex<HashMap<usize, u64>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.conversation_script.push(preset);
    }

    /// Shorthand for a step that replies with `text`.
    #[inline]
    pub fn add_text_reply(&mut self, text: impl Into<String>) {
        self.add_assistant_response_step(PresetResponse::with_text(text));
    }

    /// Sets the delay before every streamed event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far, oldest first.
    pub fn received_requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn should_fail(&self, step_idx: usize, preset: &PresetResponse) -> bool {
        let Some(failures) = preset.failures else {
            return false;
        };
        if failures == 0 {
            return true;
        }
        let Ok(mut attempts) = self.attempts.lock() else {
            return true;
        };
        let attempt = attempts.entry(step_idx).or_default();
        *attempt += 1;
        *attempt <= failures
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }

        let user_turns = req
            .messages
            .iter()
            .filter(|msg| matches!(msg, ModelMessage::User(_)))
            .count();
        let result = 'blk: {
            let Some(step_idx) = user_turns.checked_sub(1) else {
                break 'blk Err(Error {
                    message: "no user input",
                    kind: ErrorKind::Other,
                });
            };
            let Some(preset) = self.conversation_script.get(step_idx) else {
                break 'blk Err(Error {
                    message: "no enough steps",
                    kind: ErrorKind::Other,
                });
            };
            if self.should_fail(step_idx, preset) {
                break 'blk Err(Error {
                    message: "preset failure",
                    kind: preset.failure_kind,
                });
            }
            Ok(TestModelResponse {
                events: preset.events.clone(),
                delay: preset
                    .delay
                    .or(self.delay)
                    .unwrap_or(Duration::from_millis(1)),
                event_idx: 0,
                sleep: None,
            })
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use super::*;

    async fn collect_response(resp: TestModelResponse) -> String {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(_) => break,
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
            }
        }
        msg
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.add_text_reply("Sure.");

        let mut req = ModelRequest::with_messages([
            ModelMessage::System("Be nice.".to_owned()),
            ModelMessage::User("Hi".to_owned()),
        ]);
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await, "Hello, world!");

        req.messages
            .push(ModelMessage::Assistant("Hello, world!".to_owned()));
        req.messages.push(ModelMessage::User("Help me".to_owned()));
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await, "Sure.");

        assert_eq!(provider.received_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_not_enough_steps() {
        let provider = TestModelProvider::default();
        let req =
            ModelRequest::with_messages([ModelMessage::User("Hi".to_owned())]);
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_preset_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(
            PresetResponse::with_text("Finally")
                .with_failures(2)
                .with_failure_kind(ErrorKind::RateLimitExceeded),
        );
        let req =
            ModelRequest::with_messages([ModelMessage::User("Hi".to_owned())]);

        for _ in 0..2 {
            let err = provider.send_request(&req).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        let resp = provider.clone().send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await, "Finally");
    }

    #[tokio::test]
    async fn test_always_failing() {
        let mut provider = TestModelProvider::default();
        provider.add_assistant_response_step(PresetResponse::always_failing(
            ErrorKind::Moderated,
        ));
        let req =
            ModelRequest::with_messages([ModelMessage::User("Hi".to_owned())]);
        for _ in 0..3 {
            let err = provider.send_request(&req).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Moderated);
        }
    }
}
