use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use little_chat_model::{ModelFinishReason, ModelResponse, ModelResponseEvent};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Sse;
use crate::proto::GenerateContentChunk;

struct PartialState {
    sse: Sse,
    // Events parsed from a chunk but not yet returned to the caller.
    pending_events: VecDeque<ModelResponseEvent>,
    completed: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl GeminiResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            pending_events: Default::default(),
            completed: false,
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.completed {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Some proxies close the stream without a finish reason.
                partial_state.completed = true;
                partial_state
                    .pending_events
                    .push_back(ModelResponseEvent::Completed(
                        ModelFinishReason::Stop,
                    ));
                continue;
            }
            Err(err) => {
                return Err(Error::Malformed(format!("{err:?}")));
            }
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<GenerateContentChunk>(&sse_event)
            .map_err(|err| Error::Malformed(err.to_string()))?;
        handle_chunk(&mut partial_state, chunk)?;
    }
}

/// Turns a chunk into pending events. The order is important: the message
/// delta always comes before the completion event.
fn handle_chunk(
    partial_state: &mut PartialState,
    chunk: GenerateContentChunk,
) -> Result<(), Error> {
    if let Some(reason) = chunk
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(Error::Blocked(format!("prompt blocked: {reason}")));
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(());
    };

    let text = candidate.text();
    if !text.is_empty() {
        partial_state
            .pending_events
            .push_back(ModelResponseEvent::MessageDelta(text));
    }

    let Some(finish_reason) = candidate.finish_reason else {
        return Ok(());
    };
    let finish_reason = match finish_reason.as_str() {
        "MAX_TOKENS" => ModelFinishReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"
        | "SPII" => {
            return Err(Error::Blocked(format!(
                "response blocked: {finish_reason}"
            )));
        }
        _ => ModelFinishReason::Stop,
    };
    partial_state.completed = true;
    partial_state
        .pending_events
        .push_back(ModelResponseEvent::Completed(finish_reason));
    Ok(())
}
