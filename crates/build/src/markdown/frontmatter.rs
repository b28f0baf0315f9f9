//! Leading YAML frontmatter and its conversion into a document head.

use crate::error::BuildError;
use micro_city::{DocumentHead, DocumentMeta};
use serde_json::{Map, Value};

const FENCE: &str = "---";

/// Frontmatter attributes in the order they were written.
pub type FrontmatterAttrs = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Frontmatter<'a> {
    /// `None` when the source has no frontmatter block or the block is empty.
    pub attrs: Option<FrontmatterAttrs>,
    /// The source after the closing fence.
    pub body: &'a str,
}

/// Splits a leading `---` fenced YAML block off `source`.
pub fn parse_frontmatter(source: &str) -> Result<Frontmatter<'_>, BuildError> {
    let Some(rest) = source.strip_prefix("---\n").or_else(|| source.strip_prefix("---\r\n")) else {
        return Ok(Frontmatter { attrs: None, body: source });
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let attrs = parse_attrs(&rest[..offset])?;
            return Ok(Frontmatter { attrs, body: &rest[offset + line.len()..] });
        }
        offset += line.len();
    }
    Err(BuildError::UnclosedFrontmatter)
}

fn parse_attrs(yaml: &str) -> Result<Option<FrontmatterAttrs>, BuildError> {
    if yaml.trim().is_empty() {
        return Ok(None);
    }
    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Null => Ok(None),
        Value::Object(attrs) if attrs.is_empty() => Ok(None),
        Value::Object(attrs) => Ok(Some(attrs)),
        Value::Bool(_) => Err(BuildError::FrontmatterNotMapping { found: "a boolean" }),
        Value::Number(_) => Err(BuildError::FrontmatterNotMapping { found: "a number" }),
        Value::String(_) => Err(BuildError::FrontmatterNotMapping { found: "a string" }),
        Value::Array(_) => Err(BuildError::FrontmatterNotMapping { found: "a list" }),
    }
}

/// Converts frontmatter attributes into the `head` export of a content page.
///
/// `title` becomes the title, `og` or `opengraph` (one mapping or a list of them) become
/// `og:*` property meta, and every other non null attribute becomes a `name` meta. An
/// opengraph `title: true` or `description: true` reuses the top level attribute of that
/// name. Returns `None` for empty attributes.
pub fn frontmatter_to_head(attrs: &FrontmatterAttrs) -> Option<DocumentHead> {
    if attrs.is_empty() {
        return None;
    }

    let mut head = DocumentHead::default();
    for (name, value) in attrs {
        match (name.as_str(), value) {
            (_, Value::Null) => {}
            ("title", value) => head.title = Some(to_content(value).replace("\\@", "@")),
            ("og" | "opengraph", Value::Array(graphs)) => {
                graphs.iter().for_each(|graph| push_opengraph(&mut head, graph, attrs));
            }
            ("og" | "opengraph", graph @ Value::Object(_)) => push_opengraph(&mut head, graph, attrs),
            ("og" | "opengraph", _) => {}
            (name, value) => head.meta.push(DocumentMeta::name(name, to_content(value))),
        }
    }
    Some(head)
}

fn push_opengraph(head: &mut DocumentHead, graph: &Value, attrs: &FrontmatterAttrs) {
    let Value::Object(graph) = graph else {
        return;
    };
    for (property, content) in graph {
        let content = match (property.as_str(), content) {
            ("title" | "description", Value::Bool(true)) => match attrs.get(property) {
                Some(inherited) if !inherited.is_null() => to_content(inherited),
                _ => continue,
            },
            (_, content) => to_content(content),
        };
        head.meta.push(DocumentMeta::property(format!("og:{property}"), content));
    }
}

fn to_content(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(to_content).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
