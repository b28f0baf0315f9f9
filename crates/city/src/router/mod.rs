//! The route table: compiled route entries, fallback entries and menus.
//!
//! A [`CityPlan`] is built once and shared read-only by every request. Entries are searched
//! in the order they were added, so [`CityPlanBuilder::build`] rejects a static route that an
//! earlier entry would always win over.

mod matcher;
mod pattern;

pub use matcher::{MatchedRoute, find_menu, match_route};
pub use pattern::RoutePattern;

use crate::error::RouteTableError;
use crate::module::{CachedMenuLoader, CachedModuleLoader, MenuLoader, ModuleLoader};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    /// Has a component, answered by the renderer unless the data form is requested.
    Page,
    /// Handlers only, always answered with data.
    Endpoint,
}

pub struct RouteEntry {
    pub pattern: RoutePattern,
    /// Layout loaders outer-to-inner, then the page or endpoint loader.
    pub loaders: Vec<Arc<dyn ModuleLoader>>,
    pub route_type: RouteType,
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("pattern", &self.pattern)
            .field("loaders", &self.loaders.len())
            .field("route_type", &self.route_type)
            .finish()
    }
}

pub struct MenuEntry {
    /// The directory the menu belongs to.
    pub pathname: String,
    pub loader: Arc<dyn MenuLoader>,
}

impl fmt::Debug for MenuEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuEntry").field("pathname", &self.pathname).finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct CityPlan {
    routes: Vec<RouteEntry>,
    fallback_routes: Vec<RouteEntry>,
    menus: Vec<MenuEntry>,
    trailing_slash: bool,
}

impl CityPlan {
    pub fn builder() -> CityPlanBuilder {
        CityPlanBuilder::new()
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn fallback_routes(&self) -> &[RouteEntry] {
        &self.fallback_routes
    }

    pub fn menus(&self) -> &[MenuEntry] {
        &self.menus
    }

    pub fn trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    pub fn match_route(&self, pathname: &str) -> Option<MatchedRoute<'_>> {
        match_route(&self.routes, pathname, self.trailing_slash)
    }

    pub fn match_fallback(&self, pathname: &str) -> Option<MatchedRoute<'_>> {
        match_route(&self.fallback_routes, pathname, self.trailing_slash)
    }

    pub fn find_menu(&self, pathname: &str) -> Option<&MenuEntry> {
        find_menu(&self.menus, pathname)
    }
}

enum PendingRoute {
    Primary(String, Vec<Arc<dyn ModuleLoader>>, RouteType),
    Fallback(String, Vec<Arc<dyn ModuleLoader>>),
}

impl fmt::Debug for PendingRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingRoute::Primary(template, _, route_type) => f.debug_tuple("Primary").field(template).field(route_type).finish(),
            PendingRoute::Fallback(template, _) => f.debug_tuple("Fallback").field(template).finish(),
        }
    }
}

pub struct CityPlanBuilder {
    routes: Vec<PendingRoute>,
    menus: Vec<(String, Arc<dyn MenuLoader>)>,
    trailing_slash: bool,
    cache_modules: bool,
}

impl fmt::Debug for CityPlanBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CityPlanBuilder")
            .field("routes", &self.routes)
            .field("menus", &self.menus.iter().map(|(pathname, _)| pathname).collect::<Vec<_>>())
            .field("trailing_slash", &self.trailing_slash)
            .field("cache_modules", &self.cache_modules)
            .finish()
    }
}

impl CityPlanBuilder {
    fn new() -> Self {
        Self { routes: Vec::new(), menus: Vec::new(), trailing_slash: false, cache_modules: true }
    }

    /// Adds a page route.
    pub fn route(self, template: impl Into<String>, loaders: Vec<Arc<dyn ModuleLoader>>) -> Self {
        self.route_with_type(template, loaders, RouteType::Page)
    }

    /// Adds an endpoint route.
    pub fn endpoint(self, template: impl Into<String>, loaders: Vec<Arc<dyn ModuleLoader>>) -> Self {
        self.route_with_type(template, loaders, RouteType::Endpoint)
    }

    pub fn route_with_type(
        mut self,
        template: impl Into<String>,
        loaders: Vec<Arc<dyn ModuleLoader>>,
        route_type: RouteType,
    ) -> Self {
        self.routes.push(PendingRoute::Primary(template.into(), loaders, route_type));
        self
    }

    /// Adds a route consulted only when no primary route matches, such as a custom 404 page.
    pub fn fallback_route(mut self, template: impl Into<String>, loaders: Vec<Arc<dyn ModuleLoader>>) -> Self {
        self.routes.push(PendingRoute::Fallback(template.into(), loaders));
        self
    }

    /// Adds the menu of the `pathname` directory; list deeper directories first.
    pub fn menu(mut self, pathname: impl Into<String>, loader: Arc<dyn MenuLoader>) -> Self {
        self.menus.push((pathname.into(), loader));
        self
    }

    pub fn trailing_slash(mut self, trailing_slash: bool) -> Self {
        self.trailing_slash = trailing_slash;
        self
    }

    /// Keeps every loaded module and menu for the lifetime of the plan, on by default.
    pub fn cache_modules(mut self, cache_modules: bool) -> Self {
        self.cache_modules = cache_modules;
        self
    }

    pub fn build(self) -> Result<CityPlan, RouteTableError> {
        let mut module_cache = LoaderCache::new(self.cache_modules);

        let mut routes = Vec::new();
        let mut fallback_routes = Vec::new();
        for pending in self.routes {
            match pending {
                PendingRoute::Primary(template, loaders, route_type) => {
                    let loaders = loaders.into_iter().map(|loader| module_cache.wrap(loader)).collect();
                    routes.push(RouteEntry { pattern: RoutePattern::parse(template)?, loaders, route_type });
                }
                PendingRoute::Fallback(template, loaders) => {
                    let loaders = loaders.into_iter().map(|loader| module_cache.wrap(loader)).collect();
                    fallback_routes.push(RouteEntry {
                        pattern: RoutePattern::parse(template)?,
                        loaders,
                        route_type: RouteType::Page,
                    });
                }
            }
        }

        check_shadowed(&routes)?;
        check_shadowed(&fallback_routes)?;

        let menus = self
            .menus
            .into_iter()
            .map(|(pathname, loader)| {
                let loader: Arc<dyn MenuLoader> =
                    if self.cache_modules { Arc::new(CachedMenuLoader::new(loader)) } else { loader };
                MenuEntry { pathname, loader }
            })
            .collect();

        debug!(routes = routes.len(), fallback_routes = fallback_routes.len(), "route table built");
        Ok(CityPlan { routes, fallback_routes, menus, trailing_slash: self.trailing_slash })
    }
}

// a static route listed after a route that already matches its path can never be reached
fn check_shadowed(routes: &[RouteEntry]) -> Result<(), RouteTableError> {
    for (index, route) in routes.iter().enumerate() {
        let Some(path) = route.pattern.static_path() else {
            continue;
        };
        if let Some(earlier) = routes[..index].iter().find(|earlier| earlier.pattern.matches(path).is_some()) {
            return Err(RouteTableError::Shadowed {
                route: route.pattern.template().to_owned(),
                shadowed_by: earlier.pattern.template().to_owned(),
            });
        }
    }
    Ok(())
}

// one cache per distinct loader, so a layout shared by many routes loads once
struct LoaderCache {
    enabled: bool,
    wrapped: HashMap<*const (), Arc<dyn ModuleLoader>>,
}

impl LoaderCache {
    fn new(enabled: bool) -> Self {
        Self { enabled, wrapped: HashMap::new() }
    }

    fn wrap(&mut self, loader: Arc<dyn ModuleLoader>) -> Arc<dyn ModuleLoader> {
        if !self.enabled {
            return loader;
        }
        let key = Arc::as_ptr(&loader).cast::<()>();
        let cached = self.wrapped.entry(key).or_insert_with(|| Arc::new(CachedModuleLoader::new(Arc::clone(&loader))));
        Arc::clone(cached)
    }
}
