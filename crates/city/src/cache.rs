//! Read-through response cache in front of any [`RequestHandler`].
//!
//! Only `GET` requests consult the cache. On a miss the live response goes back to the
//! caller right away; its body is copied while it streams, and once the body ends the copy is
//! stored through [`WaitUntil`] if the response is successful and carries `Cache-Control`.
//! Cache failures are logged and never change the response.

use crate::body::ResponseBody;
use crate::error::{BoxError, CacheError};
use crate::request::RequestContext;
use crate::server::RequestHandler;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use http::header::CACHE_CONTROL;
use http::{HeaderMap, Method, Response, StatusCode, Uri};
use http_body::{Body as HttpBody, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The normalized request a response is cached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    uri: String,
}

impl CacheKey {
    pub fn new(method: Method, uri: &Uri) -> Self {
        Self { method, uri: uri.to_string() }
    }

    pub fn from_request(request: &RequestContext) -> Self {
        Self::new(request.method().clone(), request.uri())
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn into_response(self) -> Response<ResponseBody> {
        let mut response = Response::new(ResponseBody::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// The storage a platform provides.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<CachedResponse>, CacheError>;

    async fn store(&self, key: CacheKey, response: CachedResponse) -> Result<(), CacheError>;
}

/// Keeps background work alive after the response was handed back, as hosts with a
/// request scoped lifetime require.
pub trait WaitUntil: Send + Sync {
    fn wait_until(&self, task: BoxFuture<'static, ()>);
}

/// Runs background work on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioWaitUntil;

impl WaitUntil for TokioWaitUntil {
    fn wait_until(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}

pub struct CachedHandler<H> {
    inner: H,
    cache: Arc<dyn ResponseCache>,
    wait_until: Arc<dyn WaitUntil>,
}

impl<H: fmt::Debug> fmt::Debug for CachedHandler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedHandler").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl<H: RequestHandler> CachedHandler<H> {
    pub fn new(inner: H, cache: impl ResponseCache + 'static) -> Self {
        Self { inner, cache: Arc::new(cache), wait_until: Arc::new(TokioWaitUntil) }
    }

    pub fn wait_until(mut self, wait_until: Arc<dyn WaitUntil>) -> Self {
        self.wait_until = wait_until;
        self
    }

    fn store_when_complete(&self, key: CacheKey, response: Response<ResponseBody>) -> Response<ResponseBody> {
        let (parts, body) = response.into_parts();
        let (sender, receiver) = oneshot::channel::<Bytes>();

        let cache = Arc::clone(&self.cache);
        let status = parts.status;
        let headers = parts.headers.clone();
        self.wait_until.wait_until(Box::pin(async move {
            let Ok(body) = receiver.await else {
                debug!(uri = key.uri(), "response body not read to the end, skip cache store");
                return;
            };
            if let Err(e) = cache.store(key, CachedResponse { status, headers, body }).await {
                warn!(cause = %e, "cache store failed");
            }
        }));

        Response::from_parts(parts, ResponseBody::stream(TeeBody::new(body, sender)))
    }
}

#[async_trait]
impl<H: RequestHandler> RequestHandler for CachedHandler<H> {
    async fn invoke(&self, request: RequestContext) -> Response<ResponseBody> {
        if request.method() != Method::GET {
            return self.inner.invoke(request).await;
        }

        let key = CacheKey::from_request(&request);
        match self.cache.lookup(&key).await {
            Ok(Some(cached)) => {
                debug!(uri = key.uri(), "cache hit");
                return cached.into_response();
            }
            Ok(None) => {}
            Err(e) => warn!(cause = %e, "cache lookup failed"),
        }

        let response = self.inner.invoke(request).await;
        if !is_cacheable(&response) {
            return response;
        }
        self.store_when_complete(key, response)
    }
}

fn is_cacheable(response: &Response<ResponseBody>) -> bool {
    response.status().is_success() && response.headers().contains_key(CACHE_CONTROL)
}

pin_project! {
    // hands a copy of the body to the receiver once the body ended without error
    struct TeeBody {
        #[pin]
        inner: ResponseBody,
        buffer: BytesMut,
        sender: Option<oneshot::Sender<Bytes>>,
    }
}

impl TeeBody {
    fn new(inner: ResponseBody, sender: oneshot::Sender<Bytes>) -> Self {
        Self { inner, buffer: BytesMut::new(), sender: Some(sender) }
    }
}

impl HttpBody for TeeBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        match ready!(this.inner.poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.buffer.extend_from_slice(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(e)) => {
                this.sender.take();
                Poll::Ready(Some(Err(e)))
            }
            None => {
                if let Some(sender) = this.sender.take()
                    && sender.send(this.buffer.split().freeze()).is_err()
                {
                    debug!("cache store task is gone");
                }
                Poll::Ready(None)
            }
        }
    }

    // stays open until the end was observed, so the copy is always handed over
    fn is_end_stream(&self) -> bool {
        self.sender.is_none() && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::empty_body;
    use http::{HeaderValue, Request};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
        status: StatusCode,
        cache_control: Option<&'static str>,
    }

    impl CountingHandler {
        fn new(status: StatusCode, cache_control: Option<&'static str>) -> Self {
            Self { calls: AtomicUsize::new(0), status, cache_control }
        }
    }

    #[async_trait]
    impl RequestHandler for CountingHandler {
        async fn invoke(&self, _request: RequestContext) -> Response<ResponseBody> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut response = Response::new(ResponseBody::from("fresh"));
            *response.status_mut() = self.status;
            if let Some(cache_control) = self.cache_control {
                response.headers_mut().insert(CACHE_CONTROL, HeaderValue::from_static(cache_control));
            }
            response
        }
    }

    #[derive(Default)]
    struct CollectingWaitUntil {
        tasks: Mutex<Vec<BoxFuture<'static, ()>>>,
    }

    impl WaitUntil for CollectingWaitUntil {
        fn wait_until(&self, task: BoxFuture<'static, ()>) {
            self.tasks.lock().unwrap().push(task);
        }
    }

    impl CollectingWaitUntil {
        async fn run_all(&self) -> usize {
            let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
            let count = tasks.len();
            for task in tasks {
                task.await;
            }
            count
        }
    }

    fn request(method: Method, uri: &str) -> RequestContext {
        Request::builder().method(method).uri(uri).body(empty_body()).unwrap().into()
    }

    async fn body_of(response: Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_hit_skips_handler() {
        let mut cache = MockResponseCache::new();
        cache.expect_lookup().times(1).returning(|key| {
            assert_eq!(key.uri(), "/products?page=2");
            Ok(Some(CachedResponse { status: StatusCode::OK, headers: HeaderMap::new(), body: Bytes::from("cached") }))
        });
        cache.expect_store().never();

        let handler = CachedHandler::new(CountingHandler::new(StatusCode::OK, Some("max-age=60")), cache);
        let response = handler.invoke(request(Method::GET, "/products?page=2")).await;

        assert_eq!(body_of(response).await, Bytes::from("cached"));
        assert_eq!(handler.inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_miss_stores_after_body_is_read() {
        let stored = Arc::new(Mutex::new(Vec::new()));
        let stored_in_cache = Arc::clone(&stored);

        let mut cache = MockResponseCache::new();
        cache.expect_lookup().returning(|_| Ok(None));
        cache.expect_store().times(1).returning(move |key, response| {
            stored_in_cache.lock().unwrap().push((key, response));
            Ok(())
        });

        let wait_until = Arc::new(CollectingWaitUntil::default());
        let handler = CachedHandler::new(CountingHandler::new(StatusCode::OK, Some("max-age=60")), cache)
            .wait_until(Arc::clone(&wait_until) as Arc<dyn WaitUntil>);

        let response = handler.invoke(request(Method::GET, "/products")).await;
        assert!(stored.lock().unwrap().is_empty());

        assert_eq!(body_of(response).await, Bytes::from("fresh"));
        assert_eq!(wait_until.run_all().await, 1);

        let stored = stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, CacheKey::new(Method::GET, &Uri::from_static("/products")));
        assert_eq!(stored[0].1.body, Bytes::from("fresh"));
        assert_eq!(stored[0].1.headers[CACHE_CONTROL], "max-age=60");
    }

    #[tokio::test]
    async fn test_not_stored_without_cache_control_or_on_error_status() {
        for (status, cache_control) in [(StatusCode::OK, None), (StatusCode::NOT_FOUND, Some("max-age=60"))] {
            let mut cache = MockResponseCache::new();
            cache.expect_lookup().returning(|_| Ok(None));
            cache.expect_store().never();

            let wait_until = Arc::new(CollectingWaitUntil::default());
            let handler = CachedHandler::new(CountingHandler::new(status, cache_control), cache)
                .wait_until(Arc::clone(&wait_until) as Arc<dyn WaitUntil>);

            let response = handler.invoke(request(Method::GET, "/products")).await;
            assert_eq!(response.status(), status);
            assert_eq!(body_of(response).await, Bytes::from("fresh"));
            assert_eq!(wait_until.run_all().await, 0);
        }
    }

    #[tokio::test]
    async fn test_only_get_consults_cache() {
        let mut cache = MockResponseCache::new();
        cache.expect_lookup().never();
        cache.expect_store().never();

        let handler = CachedHandler::new(CountingHandler::new(StatusCode::OK, Some("max-age=60")), cache);
        let response = handler.invoke(request(Method::POST, "/products")).await;

        assert_eq!(body_of(response).await, Bytes::from("fresh"));
        assert_eq!(handler.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_failures_do_not_affect_response() {
        let mut cache = MockResponseCache::new();
        cache.expect_lookup().returning(|_| Err(CacheError::lookup("connection reset")));
        cache.expect_store().times(1).returning(|_, _| Err(CacheError::store("quota exceeded")));

        let wait_until = Arc::new(CollectingWaitUntil::default());
        let handler = CachedHandler::new(CountingHandler::new(StatusCode::OK, Some("max-age=60")), cache)
            .wait_until(Arc::clone(&wait_until) as Arc<dyn WaitUntil>);

        let response = handler.invoke(request(Method::GET, "/products")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, Bytes::from("fresh"));
        assert_eq!(wait_until.run_all().await, 1);
    }

    #[tokio::test]
    async fn test_unread_body_is_not_stored() {
        let mut cache = MockResponseCache::new();
        cache.expect_lookup().returning(|_| Ok(None));
        cache.expect_store().never();

        let wait_until = Arc::new(CollectingWaitUntil::default());
        let handler = CachedHandler::new(CountingHandler::new(StatusCode::OK, Some("max-age=60")), cache)
            .wait_until(Arc::clone(&wait_until) as Arc<dyn WaitUntil>);

        drop(handler.invoke(request(Method::GET, "/products")).await);
        assert_eq!(wait_until.run_all().await, 1);
    }
}
