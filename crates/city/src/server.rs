//! The host facing entry points: turns outcomes into HTTP responses.
//!
//! [`CityHandler`] is the one place where failures are caught. A handler error, a loader
//! error or a panic anywhere in the pipeline becomes a `500` plain text response, so nothing
//! escapes to the host request cycle.

use crate::body::{ResponseBody, stream_response};
use crate::error::{CityError, HandlerBuildError};
use crate::output::ResolvedBody;
use crate::pipeline::{EndpointResponse, Outcome, Pipeline};
use crate::render::Renderer;
use crate::request::RequestContext;
use crate::router::CityPlan;
use async_trait::async_trait;
use futures::FutureExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

const JSON_UTF_8: &str = "application/json; charset=utf-8";
const HTML_UTF_8: &str = "text/html; charset=utf-8";
const TEXT_UTF_8: &str = "text/plain; charset=utf-8";

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, request: RequestContext) -> Response<ResponseBody>;
}

#[async_trait]
impl<H: RequestHandler + ?Sized> RequestHandler for Arc<H> {
    async fn invoke(&self, request: RequestContext) -> Response<ResponseBody> {
        H::invoke(self, request).await
    }
}

pub struct CityHandler {
    pipeline: Pipeline,
    renderer: Arc<dyn Renderer>,
}

impl fmt::Debug for CityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CityHandler").field("pipeline", &self.pipeline).finish_non_exhaustive()
    }
}

pub struct CityHandlerBuilder {
    plan: Option<Arc<CityPlan>>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl fmt::Debug for CityHandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CityHandlerBuilder")
            .field("plan", &self.plan)
            .field("has_renderer", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

impl CityHandlerBuilder {
    fn new() -> Self {
        Self { plan: None, renderer: None }
    }

    pub fn plan(mut self, plan: impl Into<Arc<CityPlan>>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn build(self) -> Result<CityHandler, HandlerBuildError> {
        let plan = self.plan.ok_or(HandlerBuildError::MissingPlan)?;
        let renderer = self.renderer.ok_or(HandlerBuildError::MissingRenderer)?;
        Ok(CityHandler { pipeline: Pipeline::new(plan), renderer })
    }
}

impl CityHandler {
    pub fn builder() -> CityHandlerBuilder {
        CityHandlerBuilder::new()
    }

    pub fn plan(&self) -> &CityPlan {
        self.pipeline.plan()
    }

    /// Answers from the primary route table, `None` when no route matches.
    pub async fn request_handler(&self, request: &RequestContext) -> Option<Response<ResponseBody>> {
        match guard(self.pipeline.resolve_primary(request)).await {
            Ok(Some(outcome)) => Some(self.respond(outcome)),
            Ok(None) => None,
            Err(e) => Some(fatal_response(&e)),
        }
    }

    /// Answers an unmatched request from the fallback table, or with a plain `404`.
    pub async fn not_found_handler(&self, request: &RequestContext) -> Response<ResponseBody> {
        match guard(self.pipeline.resolve_fallback(request)).await {
            Ok(outcome) => self.respond(outcome),
            Err(e) => fatal_response(&e),
        }
    }

    fn respond(&self, outcome: Outcome) -> Response<ResponseBody> {
        match outcome {
            Outcome::Redirect { status, headers, .. } => response(status, headers, ResponseBody::empty()),
            Outcome::Data(endpoint_response) => match data_response(endpoint_response) {
                Ok(response) => response,
                Err(e) => fatal_response(&e),
            },
            Outcome::Render(mut render) => {
                let mut headers = std::mem::take(&mut render.headers);
                default_content_type(&mut headers, HTML_UTF_8);
                let renderer = Arc::clone(&self.renderer);
                stream_response(render.status, headers, move |writer| async move { renderer.render(render, writer).await })
            }
            Outcome::MethodNotAllowed => plain_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
            Outcome::NotFound => plain_response(StatusCode::NOT_FOUND, "Not Found"),
        }
    }
}

#[async_trait]
impl RequestHandler for CityHandler {
    async fn invoke(&self, request: RequestContext) -> Response<ResponseBody> {
        match self.request_handler(&request).await {
            Some(response) => response,
            None => self.not_found_handler(&request).await,
        }
    }
}

async fn guard<T>(future: impl Future<Output = Result<T, CityError>>) -> Result<T, CityError> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(CityError::Panic { reason: panic_reason(panic.as_ref()) }),
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        (*reason).to_owned()
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_owned()
    }
}

fn data_response(endpoint_response: EndpointResponse) -> Result<Response<ResponseBody>, CityError> {
    let EndpointResponse { status, mut headers, body } = endpoint_response;
    let body = match body {
        ResolvedBody::Empty => ResponseBody::empty(),
        ResolvedBody::Value(value) => {
            default_content_type(&mut headers, JSON_UTF_8);
            ResponseBody::from(serde_json::to_vec(&value)?)
        }
        ResolvedBody::Rejected(rejection) => {
            debug!(%rejection, "answer rejected deferred body with null");
            default_content_type(&mut headers, JSON_UTF_8);
            ResponseBody::from("null")
        }
        ResolvedBody::Stream(producer) => return Ok(stream_response(status, headers, producer)),
    };
    Ok(response(status, headers, body))
}

fn default_content_type(headers: &mut HeaderMap, content_type: &'static str) {
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
}

fn response(status: StatusCode, headers: HeaderMap, body: ResponseBody) -> Response<ResponseBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn plain_response(status: StatusCode, text: impl Into<ResponseBody>) -> Response<ResponseBody> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_UTF_8));
    response(status, headers, text.into())
}

fn fatal_response(e: &CityError) -> Response<ResponseBody> {
    error!(cause = %e, "request failed");
    plain_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Json;
    use crate::body::{StreamWriter, empty_body};
    use crate::error::BoxError;
    use crate::handler::handler_fn;
    use crate::head::DocumentHead;
    use crate::module::{RouteModule, ready_module};
    use crate::output::HandlerOutput;
    use crate::pipeline::RequestEvent;
    use crate::render::RenderRequest;
    use bytes::Bytes;
    use http::header::{ACCEPT, LOCATION};
    use http::{Method, Request};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    struct TitleRenderer;

    #[async_trait]
    impl Renderer for TitleRenderer {
        async fn render(&self, request: RenderRequest, mut writer: StreamWriter) -> Result<(), BoxError> {
            writer.write(format!("<title>{}</title>", request.head.title)).await?;
            let data = request.data.map_err(|rejection| -> BoxError { Box::new(rejection) })?;
            writer.write(data.to_string()).await?;
            Ok(())
        }
    }

    fn handler(plan: CityPlan) -> CityHandler {
        CityHandler::builder().plan(plan).renderer(TitleRenderer).build().unwrap()
    }

    fn request(method: Method, uri: &str, accept: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        builder.body(empty_body()).unwrap().into()
    }

    async fn body_of(response: Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn shop() -> CityPlan {
        let page = RouteModule::builder()
            .on_get(handler_fn(|ev: RequestEvent| async move { Json(json!({ "id": ev.params().get("id") })) }))
            .head(DocumentHead { title: Some("Shop".into()), ..DocumentHead::default() })
            .component()
            .build();
        let endpoint = RouteModule::builder()
            .on_get(handler_fn(|_ev: RequestEvent| async { Json(json!({"ok": true})) }))
            .on_delete(handler_fn(|_ev: RequestEvent| async {
                let missing: Option<Value> = None;
                missing.expect("delete exploded")
            }))
            .on_put(handler_fn(|ev: RequestEvent| async move {
                ev.response().set_status(StatusCode::ACCEPTED);
                HandlerOutput::stream(|mut writer| async move {
                    writer.write("a,").await?;
                    writer.write("b").await?;
                    Ok::<_, BoxError>(())
                })
            }))
            .build();
        let not_found = RouteModule::builder()
            .head(DocumentHead { title: Some("Missing".into()), ..DocumentHead::default() })
            .component()
            .build();

        CityPlan::builder()
            .route("/shop/[id]", vec![ready_module(page)])
            .endpoint("/api/status", vec![ready_module(endpoint)])
            .fallback_route("/shop/[...path]", vec![ready_module(not_found)])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_render_response() {
        let response = handler(shop()).invoke(request(Method::GET, "/shop/hat", None)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], HTML_UTF_8);
        assert_eq!(body_of(response).await, Bytes::from(r#"<title>Shop</title>{"id":"hat"}"#));
    }

    #[tokio::test]
    async fn test_data_response() {
        let response = handler(shop()).invoke(request(Method::GET, "/shop/hat", Some("application/json"))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], JSON_UTF_8);
        assert_eq!(body_of(response).await, Bytes::from(r#"{"id":"hat"}"#));
    }

    #[tokio::test]
    async fn test_stream_data_response() {
        let response = handler(shop()).invoke(request(Method::PUT, "/api/status", None)).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_of(response).await, Bytes::from("a,b"));
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let response = handler(shop()).invoke(request(Method::POST, "/api/status", None)).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_UTF_8);
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let response = handler(shop()).invoke(request(Method::DELETE, "/api/status", None)).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_UTF_8);
        assert_eq!(body_of(response).await, Bytes::from("handler panicked: delete exploded"));
    }

    #[tokio::test]
    async fn test_fallback_and_plain_not_found() {
        let handler = handler(shop());

        let unmatched = request(Method::GET, "/shop/a/b", None);
        assert!(handler.request_handler(&unmatched).await.is_none());
        let response = handler.not_found_handler(&unmatched).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, Bytes::from("<title>Missing</title>null"));

        let response = handler.invoke(request(Method::GET, "/elsewhere", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, Bytes::from("Not Found"));
    }

    #[tokio::test]
    async fn test_redirect_response() {
        let login = RouteModule::builder()
            .on_request(handler_fn(|ev: RequestEvent| async move {
                ev.response().redirect("/login", Some(StatusCode::SEE_OTHER))
            }))
            .component()
            .build();
        let plan = CityPlan::builder().route("/account", vec![ready_module(login)]).build().unwrap();

        let response = handler(plan).invoke(request(Method::GET, "/account", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/login");
        assert!(body_of(response).await.is_empty());
    }

    #[test]
    fn test_builder_requires_renderer() {
        let result = CityHandler::builder().plan(CityPlan::builder().build().unwrap()).build();
        assert!(matches!(result, Err(HandlerBuildError::MissingRenderer)));
    }

    #[test]
    fn test_builder_debug_hides_renderer() {
        let builder = CityHandler::builder().renderer(TitleRenderer);
        let debug = format!("{builder:?}");
        assert!(debug.starts_with("CityHandlerBuilder"));
        assert!(debug.contains("has_renderer: true"));
    }

    #[tokio::test]
    async fn test_invoke_runs_on_spawned_task() {
        let handler = Arc::new(handler(shop()));
        let task = tokio::spawn(async move { handler.invoke(request(Method::GET, "/shop/hat", None)).await });
        let response = task.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
