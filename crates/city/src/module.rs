//! Route modules and the loaders that produce them.
//!
//! A route entry lists its modules outer-to-inner: every enclosing layout first, the page or
//! endpoint last. Each module is produced by a [`ModuleLoader`]; with module caching on the
//! loader runs once per process and every later request reuses the same [`RouteModule`].

use crate::content::{ContentHeading, ContentMenu};
use crate::error::BoxError;
use crate::handler::EndpointHandler;
use crate::head::{DocumentHead, DocumentHeadProps, HeadExport};
use crate::method::{HttpMethod, MethodHandlers};
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// What one page, layout or endpoint source file exports.
#[derive(Clone, Default)]
pub struct RouteModule {
    handlers: MethodHandlers,
    head: Option<HeadExport>,
    headings: Option<Vec<ContentHeading>>,
    has_default: bool,
}

impl RouteModule {
    pub fn builder() -> RouteModuleBuilder {
        RouteModuleBuilder { module: RouteModule::default() }
    }

    pub fn handlers(&self) -> &MethodHandlers {
        &self.handlers
    }

    pub fn head(&self) -> Option<&HeadExport> {
        self.head.as_ref()
    }

    pub fn headings(&self) -> Option<&[ContentHeading]> {
        self.headings.as_deref()
    }

    /// Whether the module provides a component for the renderer.
    pub fn has_default(&self) -> bool {
        self.has_default
    }
}

impl fmt::Debug for RouteModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteModule")
            .field("handlers", &self.handlers)
            .field("head", &self.head)
            .field("headings", &self.headings.as_ref().map(Vec::len))
            .field("has_default", &self.has_default)
            .finish()
    }
}

macro_rules! method_handler {
    ($method:ident, $variant:ident) => {
        #[doc = concat!("Sets the handler for ", stringify!($variant), " requests.")]
        pub fn $method<H: EndpointHandler + 'static>(mut self, handler: H) -> Self {
            self.module.handlers.set(HttpMethod::$variant, Arc::new(handler));
            self
        }
    };
}

#[derive(Debug)]
pub struct RouteModuleBuilder {
    module: RouteModule,
}

impl RouteModuleBuilder {
    /// Sets the handler that runs for every method, before the method specific one.
    pub fn on_request<H: EndpointHandler + 'static>(mut self, handler: H) -> Self {
        self.module.handlers.set_on_request(Arc::new(handler));
        self
    }

    method_handler!(on_get, Get);
    method_handler!(on_post, Post);
    method_handler!(on_put, Put);
    method_handler!(on_patch, Patch);
    method_handler!(on_delete, Delete);
    method_handler!(on_head, Head);
    method_handler!(on_options, Options);

    pub fn head(mut self, head: impl Into<HeadExport>) -> Self {
        self.module.head = Some(head.into());
        self
    }

    pub fn head_fn<F>(self, f: F) -> Self
    where
        F: Fn(&DocumentHeadProps<'_>) -> DocumentHead + Send + Sync + 'static,
    {
        self.head(HeadExport::dynamic(f))
    }

    pub fn headings(mut self, headings: Vec<ContentHeading>) -> Self {
        self.module.headings = Some(headings);
        self
    }

    /// Marks the module as providing a page or layout component.
    pub fn component(mut self) -> Self {
        self.module.has_default = true;
        self
    }

    pub fn build(self) -> RouteModule {
        self.module
    }
}

#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<RouteModule>, BoxError>;
}

#[async_trait]
pub trait MenuLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<ContentMenu>, BoxError>;
}

/// an async `Fn()` loader holder
pub struct FnLoader<F, Fut> {
    f: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> fmt::Debug for FnLoader<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader").finish_non_exhaustive()
    }
}

/// Adapts an async closure into a [`ModuleLoader`] or a [`MenuLoader`], depending on what
/// the closure resolves to.
pub fn loader_fn<F, Fut>(f: F) -> FnLoader<F, Fut>
where
    F: Fn() -> Fut,
{
    FnLoader { f, _phantom: PhantomData }
}

#[async_trait]
impl<F, Fut, E> ModuleLoader for FnLoader<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<RouteModule, E>> + Send,
    E: Into<BoxError>,
{
    async fn load(&self) -> Result<Arc<RouteModule>, BoxError> {
        (self.f)().await.map(Arc::new).map_err(Into::into)
    }
}

#[async_trait]
impl<F, Fut, E> MenuLoader for FnLoader<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ContentMenu, E>> + Send,
    E: Into<BoxError>,
{
    async fn load(&self) -> Result<Arc<ContentMenu>, BoxError> {
        (self.f)().await.map(Arc::new).map_err(Into::into)
    }
}

struct Ready<T>(Arc<T>);

#[async_trait]
impl ModuleLoader for Ready<RouteModule> {
    async fn load(&self) -> Result<Arc<RouteModule>, BoxError> {
        Ok(Arc::clone(&self.0))
    }
}

#[async_trait]
impl MenuLoader for Ready<ContentMenu> {
    async fn load(&self) -> Result<Arc<ContentMenu>, BoxError> {
        Ok(Arc::clone(&self.0))
    }
}

/// A loader for a module that is already in memory.
pub fn ready_module(module: RouteModule) -> Arc<dyn ModuleLoader> {
    Arc::new(Ready(Arc::new(module)))
}

/// A loader for a menu that is already in memory.
pub fn ready_menu(menu: ContentMenu) -> Arc<dyn MenuLoader> {
    Arc::new(Ready(Arc::new(menu)))
}

/// Memoizes the first successful load of the wrapped loader, a failed load is retried.
pub(crate) struct CachedModuleLoader {
    inner: Arc<dyn ModuleLoader>,
    cell: OnceCell<Arc<RouteModule>>,
}

impl CachedModuleLoader {
    pub(crate) fn new(inner: Arc<dyn ModuleLoader>) -> Self {
        Self { inner, cell: OnceCell::new() }
    }
}

#[async_trait]
impl ModuleLoader for CachedModuleLoader {
    async fn load(&self) -> Result<Arc<RouteModule>, BoxError> {
        self.cell.get_or_try_init(|| self.inner.load()).await.cloned()
    }
}

pub(crate) struct CachedMenuLoader {
    inner: Arc<dyn MenuLoader>,
    cell: OnceCell<Arc<ContentMenu>>,
}

impl CachedMenuLoader {
    pub(crate) fn new(inner: Arc<dyn MenuLoader>) -> Self {
        Self { inner, cell: OnceCell::new() }
    }
}

#[async_trait]
impl MenuLoader for CachedMenuLoader {
    async fn load(&self) -> Result<Arc<ContentMenu>, BoxError> {
        self.cell.get_or_try_init(|| self.inner.load()).await.cloned()
    }
}
