use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A heading extracted from a content page, `id` is unique within its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHeading {
    pub text: String,
    pub id: String,
    pub level: u8,
}

/// A navigation tree attached to a directory of routes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentMenu {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ContentMenu>>,
}

/// Content exposed to the page and layout chain of a rendered route.
#[derive(Debug, Clone, Default)]
pub struct ContentState {
    pub headings: Option<Vec<ContentHeading>>,
    pub menu: Option<Arc<ContentMenu>>,
}
