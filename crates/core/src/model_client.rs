use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use little_chat_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, Box<dyn FnMut(&str) + Send + 'static>)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the response.
    ///
    /// `on_delta` is called with every text fragment as it streams in.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl FnMut(&str) + Send + 'static,
    ) -> Result<ModelClientResponse, Box<dyn ModelProviderError>> {
        (self.handler_fn)(req, Box::new(on_delta)).await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug)]
pub struct ModelClientResponse {
    pub transcript: String,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    mut on_delta: Box<dyn FnMut(&str) + Send + 'static>,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut transcript = String::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(event) => event,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };

        let Some(event) = event else {
            break;
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                transcript.push_str(&msg);
                on_delta(&msg);
            }
            ModelResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(ModelClientResponse {
        transcript,
        finish_reason,
    })
}
