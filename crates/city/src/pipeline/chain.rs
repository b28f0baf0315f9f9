use crate::error::BoxError;
use crate::handler::EndpointHandler;
use crate::output::HandlerOutput;
use crate::request::{RequestContext, ResponseContext, RouteLocation, RouteParams};
use futures::future::BoxFuture;
use http::Uri;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// What every handler of one request receives.
///
/// Clones share the request, the response state and the position in the handler chain.
#[derive(Clone)]
pub struct RequestEvent {
    inner: Arc<EventInner>,
}

struct EventInner {
    request: RequestContext,
    response: ResponseContext,
    location: Arc<RouteLocation>,
    chain: Chain,
}

struct Chain {
    handlers: Vec<Arc<dyn EndpointHandler>>,
    cursor: Mutex<Cursor>,
    // position of the handler that produced the kept output
    output: Mutex<Option<(usize, HandlerOutput)>>,
}

#[derive(Debug, Default)]
struct Cursor {
    next: usize,
    aborted: bool,
}

impl RequestEvent {
    pub(crate) fn new(
        request: RequestContext,
        response: ResponseContext,
        location: Arc<RouteLocation>,
        handlers: Vec<Arc<dyn EndpointHandler>>,
    ) -> Self {
        let chain = Chain { handlers, cursor: Mutex::new(Cursor::default()), output: Mutex::new(None) };
        Self { inner: Arc::new(EventInner { request, response, location, chain }) }
    }

    pub fn request(&self) -> &RequestContext {
        &self.inner.request
    }

    pub fn response(&self) -> &ResponseContext {
        &self.inner.response
    }

    pub fn url(&self) -> &Uri {
        self.inner.request.uri()
    }

    pub fn params(&self) -> &RouteParams {
        self.inner.location.params()
    }

    pub fn location(&self) -> &RouteLocation {
        &self.inner.location
    }

    /// Runs the remaining handlers and returns once all of them settled.
    ///
    /// Changes they made to the response are visible afterwards. A handler that never calls
    /// `next` is followed by the remaining handlers once it returns.
    pub async fn next(&self) -> Result<(), BoxError> {
        run_chain(self.clone()).await
    }

    /// Stops the chain: no handler that has not started yet will run.
    pub fn abort(&self) {
        trace!("handler chain aborted");
        self.cursor().aborted = true;
    }

    pub fn is_aborted(&self) -> bool {
        self.cursor().aborted
    }

    pub(crate) fn take_output(&self) -> HandlerOutput {
        lock(&self.inner.chain.output).take().map_or(HandlerOutput::Empty, |(_, output)| output)
    }

    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        lock(&self.inner.chain.cursor)
    }

    // a redirect ends the chain like an abort does
    fn advance(&self) -> Option<(usize, Arc<dyn EndpointHandler>)> {
        let mut cursor = self.cursor();
        if cursor.aborted || self.inner.response.is_redirect() {
            return None;
        }
        let index = cursor.next;
        let handler = self.inner.chain.handlers.get(index).cloned()?;
        cursor.next += 1;
        Some((index, handler))
    }

    // the innermost handler that produced a body wins, whatever order the handlers return in
    fn record(&self, index: usize, output: HandlerOutput) {
        if output.is_empty() {
            return;
        }
        let mut kept = lock(&self.inner.chain.output);
        if kept.as_ref().is_none_or(|(kept_index, _)| index >= *kept_index) {
            *kept = Some((index, output));
        }
    }
}

impl fmt::Debug for RequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestEvent")
            .field("method", self.inner.request.method())
            .field("location", &self.inner.location)
            .field("handlers", &self.inner.chain.handlers.len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives the chain from its current position until it ends, aborts or redirects.
pub(crate) fn run_chain(event: RequestEvent) -> BoxFuture<'static, Result<(), BoxError>> {
    Box::pin(async move {
        while let Some((index, handler)) = event.advance() {
            let output = handler.call(event.clone()).await?;
            event.record(index, output);
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::empty_body;
    use crate::handler::handler_fn;
    use http::{Request, StatusCode};
    use serde_json::{Value, json};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn event(handlers: Vec<Arc<dyn EndpointHandler>>) -> RequestEvent {
        let request: RequestContext = Request::builder().uri("/x").body(empty_body()).unwrap().into();
        let location = Arc::new(RouteLocation::new(request.uri(), RouteParams::empty()));
        RequestEvent::new(request, ResponseContext::new(StatusCode::OK), location, handlers)
    }

    fn logging(log: &Log, name: &'static str) -> Arc<dyn EndpointHandler> {
        let log = Arc::clone(log);
        Arc::new(handler_fn(move |_ev: RequestEvent| {
            let log = Arc::clone(&log);
            async move { log.lock().unwrap().push(name) }
        }))
    }

    async fn output_value(event: &RequestEvent) -> Value {
        match event.take_output() {
            HandlerOutput::Immediate(value) => value,
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        let log = Log::default();
        let ev = event(vec![logging(&log, "a"), logging(&log, "b"), logging(&log, "c")]);

        run_chain(ev.clone()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_next_observes_downstream_state() {
        let log = Log::default();
        let seen = Arc::new(Mutex::new(None));
        let seen_in_handler = Arc::clone(&seen);
        let outer: Arc<dyn EndpointHandler> = Arc::new(handler_fn(move |ev: RequestEvent| {
            let seen = Arc::clone(&seen_in_handler);
            async move {
                ev.next().await?;
                *seen.lock().unwrap() = Some(ev.response().status());
                Ok::<_, BoxError>(())
            }
        }));
        let inner: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|ev: RequestEvent| async move {
            ev.response().set_status(StatusCode::CREATED);
        }));

        let ev = event(vec![outer, inner, logging(&log, "last")]);
        run_chain(ev.clone()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(StatusCode::CREATED));
        assert_eq!(*log.lock().unwrap(), ["last"]);
    }

    #[tokio::test]
    async fn test_abort_stops_remaining_handlers() {
        let log = Log::default();
        let abort: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|ev: RequestEvent| async move { ev.abort() }));

        let ev = event(vec![logging(&log, "a"), abort, logging(&log, "b")]);
        run_chain(ev.clone()).await.unwrap();

        assert!(ev.is_aborted());
        assert_eq!(*log.lock().unwrap(), ["a"]);
        assert_eq!(ev.response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_redirect_stops_remaining_handlers() {
        let log = Log::default();
        let redirect: Arc<dyn EndpointHandler> =
            Arc::new(handler_fn(|ev: RequestEvent| async move { ev.response().redirect("/login", None) }));

        let ev = event(vec![redirect, logging(&log, "page")]);
        run_chain(ev.clone()).await.unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(ev.response().status(), StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn test_innermost_body_wins() {
        let layout: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|_ev: RequestEvent| async { json!("layout") }));
        let page: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|_ev: RequestEvent| async { json!({"a": 1}) }));
        let after: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|_ev: RequestEvent| async {}));

        let ev = event(vec![layout, page, after]);
        run_chain(ev.clone()).await.unwrap();
        assert_eq!(output_value(&ev).await, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_layout_returning_after_next_keeps_page_body() {
        let layout: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|ev: RequestEvent| async move {
            ev.next().await?;
            Ok::<_, BoxError>(json!("layout"))
        }));
        let page: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|_ev: RequestEvent| async { json!({"a": 1}) }));

        let ev = event(vec![layout, page]);
        run_chain(ev.clone()).await.unwrap();
        assert_eq!(output_value(&ev).await, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_layout_body_kept_when_page_returns_nothing() {
        let layout: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|ev: RequestEvent| async move {
            ev.next().await?;
            Ok::<_, BoxError>(json!("layout"))
        }));
        let page: Arc<dyn EndpointHandler> = Arc::new(handler_fn(|_ev: RequestEvent| async {}));

        let ev = event(vec![layout, page]);
        run_chain(ev.clone()).await.unwrap();
        assert_eq!(output_value(&ev).await, json!("layout"));
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let log = Log::default();
        let failing: Arc<dyn EndpointHandler> =
            Arc::new(handler_fn(|_ev: RequestEvent| async { Err::<(), BoxError>("nope".into()) }));

        let ev = event(vec![failing, logging(&log, "b")]);
        assert_eq!(run_chain(ev).await.unwrap_err().to_string(), "nope");
        assert!(log.lock().unwrap().is_empty());
    }
}
