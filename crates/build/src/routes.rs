//! Compiles discovered source files into an ordered route manifest.
//!
//! Paths are relative to the routes directory and use `/` separators. Directory names become
//! route segments verbatim, so `[id]` and `[...rest]` directories produce dynamic routes.

use crate::error::BuildError;
use micro_city::{CityPlan, CityPlanBuilder, MenuLoader, ModuleLoader, RouteType};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

const PAGE_EXTENSIONS: [&str; 4] = ["tsx", "jsx", "md", "mdx"];
const ENDPOINT_EXTENSIONS: [&str; 3] = ["ts", "js", "rs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Layout,
    Menu,
    Fallback,
    Page,
    Endpoint,
}

/// One classified source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSource {
    pub kind: SourceKind,
    /// The normalized source path.
    pub source: String,
    /// The directory the file lives in, as a pathname.
    pub dir: String,
    /// The route template for pages, endpoints and fallbacks, the directory otherwise.
    pub pathname: String,
}

/// Classifies `rel_path`, returns `None` for files that take no part in routing.
pub fn parse_source_path(rel_path: &str) -> Option<RouteSource> {
    let source = rel_path.replace('\\', "/");
    let source = source.trim_start_matches("./").trim_start_matches('/').to_string();

    let (dir_segments, file_name) = match source.rsplit_once('/') {
        Some((dir, file)) => (dir.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>(), file),
        None => (Vec::new(), source.as_str()),
    };
    let (stem, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    let dir = join_pathname(&dir_segments);
    let is_page = PAGE_EXTENSIONS.contains(&ext.as_str());
    let is_endpoint = ENDPOINT_EXTENSIONS.contains(&ext.as_str());

    let (kind, pathname) = match stem {
        "_layout" if is_page || is_endpoint => (SourceKind::Layout, dir.clone()),
        "_menu" if ext == "md" => (SourceKind::Menu, dir.clone()),
        _ if stem.starts_with('_') || stem.is_empty() => return None,
        "404" if is_page => {
            let mut segments = dir_segments;
            segments.push("[...path]");
            (SourceKind::Fallback, join_pathname(&segments))
        }
        _ if is_page || is_endpoint => {
            let mut segments = dir_segments;
            if stem != "index" {
                segments.push(stem);
            }
            let kind = if is_page { SourceKind::Page } else { SourceKind::Endpoint };
            (kind, join_pathname(&segments))
        }
        _ => return None,
    };

    Some(RouteSource { kind, source, dir, pathname })
}

fn join_pathname(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRoute {
    pub pattern: String,
    pub route_type: RouteType,
    /// Source paths of the enclosing layouts, outermost first, then the route itself.
    pub modules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestMenu {
    pub pathname: String,
    pub source: String,
}

/// The route, fallback and menu tables in match order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteManifest {
    pub routes: Vec<ManifestRoute>,
    pub fallback_routes: Vec<ManifestRoute>,
    pub menus: Vec<ManifestMenu>,
}

/// Builds the manifest from every discovered source path.
///
/// Routes are ordered so that, segment by segment, static beats dynamic and dynamic beats
/// catch-all. Fallbacks and menus are ordered deepest directory first.
pub fn build_manifest<I, P>(paths: I) -> Result<RouteManifest, BuildError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    let mut layouts = HashMap::new();
    let mut claimed: HashMap<String, String> = HashMap::new();
    let mut sources = Vec::new();
    let mut menus = Vec::new();

    for path in paths {
        let Some(source) = parse_source_path(path.as_ref()) else {
            trace!(path = path.as_ref(), "ignored source file");
            continue;
        };
        match source.kind {
            SourceKind::Layout => {
                if let Some(first) = layouts.insert(source.dir.clone(), source.source.clone()) {
                    return Err(duplicate(format!("{} (layout)", source.dir), first, source.source));
                }
            }
            SourceKind::Menu => menus.push(ManifestMenu { pathname: source.pathname, source: source.source }),
            SourceKind::Page | SourceKind::Endpoint | SourceKind::Fallback => {
                if let Some(first) = claimed.insert(source.pathname.clone(), source.source.clone()) {
                    return Err(duplicate(source.pathname, first, source.source));
                }
                sources.push(source);
            }
        }
    }

    let mut manifest = RouteManifest::default();
    for source in sources {
        let mut modules = ancestor_layouts(&source.dir, &layouts);
        modules.push(source.source);
        match source.kind {
            SourceKind::Fallback => {
                manifest.fallback_routes.push(ManifestRoute {
                    pattern: source.pathname,
                    route_type: RouteType::Page,
                    modules,
                });
            }
            kind => {
                let route_type = if kind == SourceKind::Endpoint { RouteType::Endpoint } else { RouteType::Page };
                manifest.routes.push(ManifestRoute { pattern: source.pathname, route_type, modules });
            }
        }
    }

    manifest.routes.sort_by(|a, b| compare_patterns(&a.pattern, &b.pattern));
    manifest.fallback_routes.sort_by(|a, b| deepest_first(&a.pattern, &b.pattern));
    menus.sort_by(|a, b| deepest_first(&a.pathname, &b.pathname));
    manifest.menus = menus;

    debug!(
        routes = manifest.routes.len(),
        fallback_routes = manifest.fallback_routes.len(),
        menus = manifest.menus.len(),
        "built route manifest"
    );
    Ok(manifest)
}

fn duplicate(pathname: String, first: String, second: String) -> BuildError {
    BuildError::DuplicateRoute { pathname, first, second }
}

/// Layout sources from the routes root down to `dir`.
fn ancestor_layouts(dir: &str, layouts: &HashMap<String, String>) -> Vec<String> {
    let mut current = String::new();
    let mut prefixes = vec!["/".to_string()];
    for segment in dir.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        prefixes.push(current.clone());
    }
    prefixes.iter().filter_map(|prefix| layouts.get(prefix).cloned()).collect()
}

fn segments(pattern: &str) -> impl Iterator<Item = &str> {
    pattern.split('/').filter(|s| !s.is_empty())
}

fn depth(pattern: &str) -> usize {
    segments(pattern).count()
}

fn deepest_first(a: &str, b: &str) -> Ordering {
    depth(b).cmp(&depth(a)).then_with(|| a.cmp(b))
}

fn segment_rank(segment: &str) -> u8 {
    if segment.starts_with("[...") {
        2
    } else if segment.starts_with('[') {
        1
    } else {
        0
    }
}

fn compare_patterns(a: &str, b: &str) -> Ordering {
    let ranks = |pattern: &str| segments(pattern).map(segment_rank).collect::<Vec<_>>();
    ranks(a).cmp(&ranks(b)).then_with(|| a.cmp(b))
}

impl RouteManifest {
    /// Feeds the manifest into a plan builder.
    ///
    /// `module_loader` and `menu_loader` are called once per distinct source path, so a layout
    /// shared by many routes is represented by one loader and loaded once.
    pub fn plan_builder<M, N>(&self, mut module_loader: M, mut menu_loader: N) -> CityPlanBuilder
    where
        M: FnMut(&str) -> Arc<dyn ModuleLoader>,
        N: FnMut(&str) -> Arc<dyn MenuLoader>,
    {
        let mut loaders: HashMap<String, Arc<dyn ModuleLoader>> = HashMap::new();
        let mut loaders_for = |modules: &[String]| -> Vec<Arc<dyn ModuleLoader>> {
            modules
                .iter()
                .map(|source| Arc::clone(loaders.entry(source.clone()).or_insert_with(|| module_loader(source))))
                .collect()
        };

        let mut builder = CityPlan::builder();
        for route in &self.routes {
            builder = builder.route_with_type(route.pattern.clone(), loaders_for(&route.modules), route.route_type);
        }
        for route in &self.fallback_routes {
            builder = builder.fallback_route(route.pattern.clone(), loaders_for(&route.modules));
        }
        for menu in &self.menus {
            builder = builder.menu(menu.pathname.clone(), menu_loader(&menu.source));
        }
        builder
    }
}
