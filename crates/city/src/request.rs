//! Per-request views handed to handlers.
//!
//! - [`RequestContext`]: the incoming request, with single-use body accessors
//! - [`ResponseContext`]: the mutable response state shared by every handler of one request
//! - [`RouteParams`] and [`RouteLocation`]: where the request landed in the route table

use crate::body::{OptionReqBody, ReqBody};
use crate::error::BodyError;
use bytes::Bytes;
use http::header::{AsHeaderName, InvalidHeaderValue};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri, Version};
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// The incoming request as seen by handlers.
///
/// Cloning is cheap, every clone shares the same body, so the body accessors
/// ([`text`](Self::text), [`bytes`](Self::bytes), [`json`](Self::json),
/// [`form_data`](Self::form_data)) succeed once per request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    parts: Arc<http::request::Parts>,
    body: OptionReqBody,
}

impl RequestContext {
    pub fn new(request: Request<ReqBody>) -> Self {
        let (parts, body) = request.into_parts();
        Self { parts: Arc::new(parts), body: OptionReqBody::from(body) }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn version(&self) -> Version {
        self.parts.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub async fn bytes(&self) -> Result<Bytes, BodyError> {
        self.body.bytes().await
    }

    pub async fn text(&self) -> Result<String, BodyError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.into()).map_err(|_not_utf8| BodyError::NotUtf8)
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    pub async fn form_data<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        let bytes = self.bytes().await?;
        Ok(serde_urlencoded::from_bytes(&bytes)?)
    }
}

impl From<Request<ReqBody>> for RequestContext {
    fn from(request: Request<ReqBody>) -> Self {
        Self::new(request)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResponseState {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) redirect: Option<String>,
}

/// The response being assembled for one request.
///
/// Every handler in the chain sees the same state; a change made downstream of
/// [`RequestEvent::next`](crate::RequestEvent::next) is visible once `next` returns.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    state: Arc<Mutex<ResponseState>>,
}

impl ResponseContext {
    pub(crate) fn new(status: StatusCode) -> Self {
        let state = ResponseState { status, headers: HeaderMap::new(), redirect: None };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.lock().status = status;
    }

    /// Returns a snapshot of the headers set so far.
    pub fn headers(&self) -> HeaderMap {
        self.lock().headers.clone()
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<HeaderValue> {
        self.lock().headers.get(name).cloned()
    }

    pub fn with_headers<R>(&self, f: impl FnOnce(&mut HeaderMap) -> R) -> R {
        f(&mut self.lock().headers)
    }

    pub fn set_header<K, V>(&self, name: K, value: V) -> Result<(), http::Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = <HeaderName as TryFrom<K>>::try_from(name).map_err(Into::into)?;
        let value = <HeaderValue as TryFrom<V>>::try_from(value).map_err(Into::into)?;
        self.lock().headers.insert(name, value);
        Ok(())
    }

    pub fn append_header<K, V>(&self, name: K, value: V) -> Result<(), http::Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = <HeaderName as TryFrom<K>>::try_from(name).map_err(Into::into)?;
        let value = <HeaderValue as TryFrom<V>>::try_from(value).map_err(Into::into)?;
        self.lock().headers.append(name, value);
        Ok(())
    }

    /// Redirects to `url`, with `307 Temporary Redirect` unless `status` says otherwise.
    ///
    /// No further handler runs once a redirect is set, and nothing is rendered.
    pub fn redirect(&self, url: impl Into<String>, status: Option<StatusCode>) -> Result<(), InvalidHeaderValue> {
        let url = url.into();
        let location = HeaderValue::try_from(url.as_str())?;

        let mut state = self.lock();
        state.status = status.unwrap_or(StatusCode::TEMPORARY_REDIRECT);
        state.headers.insert(http::header::LOCATION, location);
        state.redirect = Some(url);
        Ok(())
    }

    pub fn is_redirect(&self) -> bool {
        self.lock().redirect.is_some()
    }

    pub(crate) fn snapshot(&self) -> ResponseState {
        self.lock().clone()
    }
}

/// Route parameters captured from the pathname, in the order the route declares them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteParams {
    entries: Arc<[(String, String)]>,
}

impl RouteParams {
    pub fn empty() -> Self {
        Self { entries: Arc::from(Vec::new()) }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.entries.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl Default for RouteParams {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<(String, String)> for RouteParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl Serialize for RouteParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Where the current request is, immutable for the duration of the request.
#[derive(Debug, Clone, Serialize)]
pub struct RouteLocation {
    params: RouteParams,
    href: String,
    pathname: String,
    query: BTreeMap<String, String>,
}

impl RouteLocation {
    pub fn new(uri: &Uri, params: RouteParams) -> Self {
        let query = uri.query().map(parse_query).unwrap_or_default();
        Self { params, href: uri.to_string(), pathname: uri.path().to_owned(), query }
    }

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }
}

// a repeated key keeps its last value
fn parse_query(query: &str) -> BTreeMap<String, String> {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(e) => {
            debug!(cause = %e, query, "ignore malformed query string");
            BTreeMap::new()
        }
    }
}
