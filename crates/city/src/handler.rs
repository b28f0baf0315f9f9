use crate::error::BoxError;
use crate::output::{HandlerOutput, IntoHandlerOutput};
use crate::pipeline::RequestEvent;
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;

/// A route handler, registered per module as `on_request` or for one [`HttpMethod`](crate::HttpMethod).
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    async fn call(&self, event: RequestEvent) -> Result<HandlerOutput, BoxError>;
}

/// an async `Fn(RequestEvent)` holder
pub struct FnHandler<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(RequestEvent) -> Fut,
{
    fn new(f: F) -> Self {
        Self { f, _phantom: PhantomData }
    }
}

impl<F, Fut> fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

/// Adapts an async closure into an [`EndpointHandler`].
///
/// The closure may return anything implementing [`IntoHandlerOutput`]: `()`, a
/// [`serde_json::Value`], a [`Json`](crate::Json) wrapper, a string, a [`HandlerOutput`],
/// or an `Option`/`Result` of those.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F, Fut>
where
    F: Fn(RequestEvent) -> Fut,
{
    FnHandler::new(f)
}

#[async_trait]
impl<F, Fut> EndpointHandler for FnHandler<F, Fut>
where
    F: Fn(RequestEvent) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: IntoHandlerOutput,
{
    async fn call(&self, event: RequestEvent) -> Result<HandlerOutput, BoxError> {
        (self.f)(event).await.into_output()
    }
}
