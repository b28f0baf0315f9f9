use crate::handler::EndpointHandler;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// The request methods a route module can register a handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    /// Returns `None` for methods outside the closed set, such as `TRACE` or `CONNECT`.
    pub fn from_method(method: &Method) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.as_str() == method.as_str())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-module dispatch table: one generic `on_request` slot plus one slot per method.
#[derive(Clone, Default)]
pub struct MethodHandlers {
    on_request: Option<Arc<dyn EndpointHandler>>,
    by_method: [Option<Arc<dyn EndpointHandler>>; 7],
}

impl MethodHandlers {
    pub fn set_on_request(&mut self, handler: Arc<dyn EndpointHandler>) {
        self.on_request = Some(handler);
    }

    pub fn set(&mut self, method: HttpMethod, handler: Arc<dyn EndpointHandler>) {
        self.by_method[method.slot()] = Some(handler);
    }

    pub fn get(&self, method: HttpMethod) -> Option<&Arc<dyn EndpointHandler>> {
        self.by_method[method.slot()].as_ref()
    }

    pub fn on_request(&self) -> Option<&Arc<dyn EndpointHandler>> {
        self.on_request.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.on_request.is_none() && self.by_method.iter().all(Option::is_none)
    }

    /// The handlers this module contributes for `method`, `on_request` first.
    pub fn chain_for(&self, method: Option<HttpMethod>) -> impl Iterator<Item = &Arc<dyn EndpointHandler>> {
        let specific = method.and_then(|method| self.get(method));
        self.on_request.iter().chain(specific)
    }
}

impl fmt::Debug for MethodHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<_> = HttpMethod::ALL.into_iter().filter(|method| self.get(*method).is_some()).collect();
        f.debug_struct("MethodHandlers")
            .field("on_request", &self.on_request.is_some())
            .field("methods", &methods)
            .finish()
    }
}
