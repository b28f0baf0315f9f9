use crate::body::StreamWriter;
use crate::content::ContentState;
use crate::error::BoxError;
use crate::head::ResolvedDocumentHead;
use crate::module::RouteModule;
use crate::output::DeferredRejection;
use crate::request::RouteLocation;
use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::sync::Arc;

/// Everything the renderer needs to produce the document of a page route.
#[derive(Debug)]
pub struct RenderRequest {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub location: Arc<RouteLocation>,
    /// The resolved page data, `null` when no handler produced a body.
    pub data: Result<Value, DeferredRejection>,
    pub head: ResolvedDocumentHead,
    pub content: ContentState,
    /// Layout modules outer-to-inner, then the page module.
    pub modules: Vec<Arc<RouteModule>>,
}

/// Turns a matched page into markup. Implemented by the view layer.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: RenderRequest, writer: StreamWriter) -> Result<(), BoxError>;
}

#[async_trait]
impl<R: Renderer + ?Sized> Renderer for Arc<R> {
    async fn render(&self, request: RenderRequest, writer: StreamWriter) -> Result<(), BoxError> {
        R::render(self, request, writer).await
    }
}
