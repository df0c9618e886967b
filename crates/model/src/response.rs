use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::provider::ModelProviderError;

/// A response from the model provider.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Attempts to pull out the next event from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   the next event. Implementations will ensure that the current
    ///   task will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the response has an event
    ///   to deliver, and may produce further events on subsequent
    ///   `poll_next_event` calls.
    /// - `Poll::Ready(Ok(None))` means the response has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the response.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// The reason why a model response has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model has finished generating text.
    Stop,
    /// The output was truncated by the token limit.
    MaxTokens,
}

/// The event from a model response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The response has been completed.
    Completed(ModelFinishReason),
    /// Received a message delta.
    MessageDelta(String),
}
