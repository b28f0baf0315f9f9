use super::{MenuEntry, RouteEntry};
use crate::request::RouteParams;
use tracing::trace;

/// A route entry together with the parameters captured from the pathname.
#[derive(Debug)]
pub struct MatchedRoute<'plan> {
    pub entry: &'plan RouteEntry,
    pub params: RouteParams,
}

/// Finds the first entry matching `pathname`.
///
/// With `trailing_slash` on, an unmatched pathname is retried once with its trailing slash
/// toggled. The root pathname is never toggled.
pub fn match_route<'plan>(routes: &'plan [RouteEntry], pathname: &str, trailing_slash: bool) -> Option<MatchedRoute<'plan>> {
    if let Some(matched) = first_match(routes, pathname) {
        return Some(matched);
    }

    if !trailing_slash || pathname == "/" {
        return None;
    }

    let toggled = match pathname.strip_suffix('/') {
        Some(stripped) => stripped.to_owned(),
        None => format!("{pathname}/"),
    };
    trace!(pathname, retry = %toggled, "retry with trailing slash toggled");
    first_match(routes, &toggled)
}

fn first_match<'plan>(routes: &'plan [RouteEntry], pathname: &str) -> Option<MatchedRoute<'plan>> {
    routes.iter().find_map(|entry| entry.pattern.matches(pathname).map(|params| MatchedRoute { entry, params }))
}

/// Finds the menu of the closest directory listed for `pathname`, in table order.
pub fn find_menu<'plan>(menus: &'plan [MenuEntry], pathname: &str) -> Option<&'plan MenuEntry> {
    let pathname = trim_trailing_slash(pathname);
    menus.iter().find(|menu| {
        let dir = trim_trailing_slash(&menu.pathname);
        dir == "/"
            || pathname == dir
            || pathname.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
    })
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 { path.strip_suffix('/').unwrap_or(path) } else { path }
}
