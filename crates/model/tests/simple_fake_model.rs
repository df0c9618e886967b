use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use little_chat_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

#[derive(Debug)]
struct FakeModelProviderError(ErrorKind);

impl Display for FakeModelProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for FakeModelProviderError {}

impl ModelProviderError for FakeModelProviderError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

#[derive(Debug)]
struct FakeModelResponse {
    fake_items: VecDeque<String>,
    completed: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl FakeModelResponse {
    fn new(input: &str, turn: usize) -> Self {
        let fake_items = format!("Turn {turn}: you said {input}")
            .split(' ')
            .map(ToString::to_string)
            .collect();
        Self {
            fake_items,
            completed: false,
            sleep: None,
        }
    }
}

impl ModelResponse for FakeModelResponse {
    type Error = FakeModelProviderError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            if let Some(mut this_item) = this.fake_items.pop_front() {
                if !this.fake_items.is_empty() {
                    this_item.push(' ');
                }
                return Poll::Ready(Ok(Some(
                    ModelResponseEvent::MessageDelta(this_item),
                )));
            }
            if !this.completed {
                this.completed = true;
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            }
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(Duration::from_millis(1))));
        Pin::new(this).poll_next_event(cx)
    }
}

/// Echoes the latest user message, numbered by how many user turns the
/// history carries.
struct FakeModelProvider;

impl ModelProvider for FakeModelProvider {
    type Error = FakeModelProviderError;
    type Response = FakeModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let result = 'blk: {
            let Some(ModelMessage::User(last)) = req.messages.last() else {
                break 'blk Err(FakeModelProviderError(ErrorKind::Other));
            };
            let turn = req
                .messages
                .iter()
                .filter(|msg| matches!(msg, ModelMessage::User(_)))
                .count();
            Ok(FakeModelResponse::new(last, turn))
        };
        ready(result)
    }
}

async fn collect(mut resp: FakeModelResponse) -> String {
    let mut message = String::new();
    loop {
        match poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx)).await {
            Ok(Some(ModelResponseEvent::MessageDelta(delta))) => {
                message.push_str(&delta);
            }
            Ok(Some(ModelResponseEvent::Completed(reason))) => {
                assert_eq!(reason, ModelFinishReason::Stop);
            }
            Ok(None) => break,
            Err(err) => unreachable!("unexpected error: {err:?}"),
        }
    }
    message
}

#[tokio::test]
async fn test_completion() {
    let provider = FakeModelProvider;
    let req = ModelRequest::with_messages([ModelMessage::User(
        "Good morning".to_string(),
    )]);
    let resp = provider.send_request(&req).await.unwrap();
    assert_eq!(collect(resp).await, "Turn 1: you said Good morning");
}

#[tokio::test]
async fn test_history_is_carried() {
    let provider = FakeModelProvider;
    let req = ModelRequest::with_messages([
        ModelMessage::System("Be brief.".to_string()),
        ModelMessage::User("Hi".to_string()),
        ModelMessage::Assistant("Hello".to_string()),
        ModelMessage::User("Again".to_string()),
    ]);
    assert_eq!(req.turn_count(), 3);
    let resp = provider.send_request(&req).await.unwrap();
    assert_eq!(collect(resp).await, "Turn 2: you said Again");
}

#[tokio::test]
async fn test_error() {
    let provider = FakeModelProvider;
    let req = ModelRequest::default();
    let err = provider.send_request(&req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Other);
    assert_eq!(err.kind().to_string(), "request failed");
}
