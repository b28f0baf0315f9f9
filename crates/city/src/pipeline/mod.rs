//! Runs the handler chain of a matched route and decides what the response becomes.
//!
//! The flow for one request is:
//!
//! 1. match the pathname against the primary table, then the fallback table
//! 2. load the route's modules and the directory menu concurrently
//! 3. run `on_request` and method handlers outer-to-inner, honoring `next`, `abort` and redirects
//! 4. resolve the body once and turn everything into an [`Outcome`]

mod chain;
mod negotiation;

pub use chain::RequestEvent;
pub use negotiation::accepts_data;

use crate::content::ContentState;
use crate::error::CityError;
use crate::head::resolve_head;
use crate::method::HttpMethod;
use crate::output::ResolvedBody;
use crate::render::RenderRequest;
use crate::request::{RequestContext, ResponseContext, RouteLocation};
use crate::router::{CityPlan, MatchedRoute, RouteType};
use chain::run_chain;
use futures::future::try_join_all;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The data answer of an endpoint, or of a page asked for its data.
#[derive(Debug)]
pub struct EndpointResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResolvedBody,
}

#[derive(Debug)]
pub enum Outcome {
    Redirect { location: String, status: StatusCode, headers: HeaderMap },
    Data(EndpointResponse),
    Render(RenderRequest),
    /// An endpoint has no handler for the request method.
    MethodNotAllowed,
    /// Neither the primary nor the fallback table matched.
    NotFound,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    plan: Arc<CityPlan>,
}

impl Pipeline {
    pub fn new(plan: Arc<CityPlan>) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &CityPlan {
        &self.plan
    }

    /// Resolves against the primary table, then the fallback table.
    pub async fn resolve(&self, request: &RequestContext) -> Result<Outcome, CityError> {
        match self.resolve_primary(request).await? {
            Some(outcome) => Ok(outcome),
            None => self.resolve_fallback(request).await,
        }
    }

    /// `None` when no primary route matches.
    pub async fn resolve_primary(&self, request: &RequestContext) -> Result<Option<Outcome>, CityError> {
        let Some(matched) = self.plan.match_route(request.uri().path()) else {
            return Ok(None);
        };
        execute(&self.plan, request, matched, StatusCode::OK).await.map(Some)
    }

    /// Runs the fallback route for the pathname with an initial `404` status.
    pub async fn resolve_fallback(&self, request: &RequestContext) -> Result<Outcome, CityError> {
        let path = request.uri().path();
        let Some(matched) = self.plan.match_fallback(path) else {
            debug!(path, "no route matched");
            return Ok(Outcome::NotFound);
        };
        execute(&self.plan, request, matched, StatusCode::NOT_FOUND).await
    }
}

async fn execute(
    plan: &CityPlan,
    request: &RequestContext,
    matched: MatchedRoute<'_>,
    initial_status: StatusCode,
) -> Result<Outcome, CityError> {
    let MatchedRoute { entry, params } = matched;
    let location = Arc::new(RouteLocation::new(request.uri(), params));
    let menu_entry = plan.find_menu(location.pathname());

    let load_modules = try_join_all(entry.loaders.iter().map(|loader| loader.load()));
    let load_menu = async {
        match menu_entry {
            Some(menu) => menu.loader.load().await.map(Some),
            None => Ok(None),
        }
    };
    let (modules, menu) = futures::join!(load_modules, load_menu);
    let modules = modules.map_err(|source| CityError::ModuleLoad { source })?;
    let menu = menu.map_err(|source| CityError::MenuLoad { source })?;

    let method = HttpMethod::from_method(request.method());
    let handlers: Vec<_> = modules.iter().flat_map(|module| module.handlers().chain_for(method)).cloned().collect();

    if entry.route_type == RouteType::Endpoint && handlers.is_empty() {
        debug!(method = %request.method(), route = entry.pattern.template(), "endpoint has no handler for method");
        return Ok(Outcome::MethodNotAllowed);
    }

    let response = ResponseContext::new(initial_status);
    let event = RequestEvent::new(request.clone(), response.clone(), Arc::clone(&location), handlers);
    run_chain(event.clone()).await.map_err(|source| CityError::Handler { source })?;

    if response.is_redirect() {
        let state = response.snapshot();
        let location = state.redirect.unwrap_or_default();
        debug!(%location, status = %state.status, "redirect");
        return Ok(Outcome::Redirect { location, status: state.status, headers: state.headers });
    }

    // a deferred body runs only now, after every handler returned
    let body = event.take_output().resolve().await;
    let state = response.snapshot();

    match entry.route_type {
        RouteType::Endpoint => {
            Ok(Outcome::Data(EndpointResponse { status: state.status, headers: state.headers, body }))
        }
        RouteType::Page if accepts_data(request) => {
            Ok(Outcome::Data(EndpointResponse { status: state.status, headers: state.headers, body }))
        }
        RouteType::Page => {
            let data = body.into_data();
            let head = resolve_head(&modules, &location, data.as_ref().unwrap_or(&Value::Null));
            let headings = modules.last().and_then(|module| module.headings()).map(<[_]>::to_vec);
            Ok(Outcome::Render(RenderRequest {
                status: state.status,
                headers: state.headers,
                location,
                data,
                head,
                content: ContentState { headings, menu },
                modules,
            }))
        }
    }
}
