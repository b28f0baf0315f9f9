//! Document head values and their resolution across the layout chain.

use crate::module::RouteModule;
use crate::request::RouteLocation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A head value as exported by a page or layout, every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentHead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<DocumentMeta>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<DocumentLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub styles: Vec<DocumentStyle>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_equiv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl DocumentMeta {
    pub fn name(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { name: Some(name.into()), content: Some(content.into()), ..Self::default() }
    }

    pub fn property(property: impl Into<String>, content: impl Into<String>) -> Self {
        Self { property: Some(property.into()), content: Some(content.into()), ..Self::default() }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub as_: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hreflang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossorigin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStyle {
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// The head after every module of a route has contributed, all fields present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedDocumentHead {
    pub title: String,
    pub meta: Vec<DocumentMeta>,
    pub links: Vec<DocumentLink>,
    pub styles: Vec<DocumentStyle>,
}

/// What a head function sees: the location, the resolved data and the head so far.
#[derive(Debug, Clone, Copy)]
pub struct DocumentHeadProps<'a> {
    pub location: &'a RouteLocation,
    pub data: &'a Value,
    pub head: &'a ResolvedDocumentHead,
}

type HeadFn = dyn Fn(&DocumentHeadProps<'_>) -> DocumentHead + Send + Sync;

/// The `head` export of a page or layout module.
#[derive(Clone)]
pub enum HeadExport {
    Static(DocumentHead),
    Dynamic(Arc<HeadFn>),
}

impl HeadExport {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&DocumentHeadProps<'_>) -> DocumentHead + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    fn evaluate(&self, props: &DocumentHeadProps<'_>) -> DocumentHead {
        match self {
            HeadExport::Static(head) => head.clone(),
            HeadExport::Dynamic(f) => f(props),
        }
    }
}

impl fmt::Debug for HeadExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadExport::Static(head) => f.debug_tuple("Static").field(head).finish(),
            HeadExport::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

impl From<DocumentHead> for HeadExport {
    fn from(head: DocumentHead) -> Self {
        HeadExport::Static(head)
    }
}

trait Keyed {
    fn key(&self) -> Option<&str>;
}

impl Keyed for DocumentMeta {
    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

impl Keyed for DocumentLink {
    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

impl Keyed for DocumentStyle {
    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

// keyed items replace the existing item with the same key in place, everything else appends
fn merge_items<T: Keyed>(existing: &mut Vec<T>, items: Vec<T>) {
    for item in items {
        let position = item.key().and_then(|key| existing.iter().position(|current| current.key() == Some(key)));
        match position {
            Some(index) => existing[index] = item,
            None => existing.push(item),
        }
    }
}

impl ResolvedDocumentHead {
    pub fn merge(&mut self, head: DocumentHead) {
        if let Some(title) = head.title {
            self.title = title;
        }
        merge_items(&mut self.meta, head.meta);
        merge_items(&mut self.links, head.links);
        merge_items(&mut self.styles, head.styles);
    }
}

/// Folds the `head` exports of `modules`, outermost layout first, page last.
pub fn resolve_head(modules: &[Arc<RouteModule>], location: &RouteLocation, data: &Value) -> ResolvedDocumentHead {
    let mut resolved = ResolvedDocumentHead::default();
    for head_export in modules.iter().filter_map(|module| module.head()) {
        let head = head_export.evaluate(&DocumentHeadProps { location, data, head: &resolved });
        resolved.merge(head);
    }
    resolved
}
