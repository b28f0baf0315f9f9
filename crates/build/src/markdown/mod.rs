//! The build-time pass over a parsed content page.
//!
//! [`transform`] runs once per markdown source after the external parser has produced its
//! [`Node`] tree. It rewrites local links to sibling content files, gives every heading a
//! unique `id`, and prepends a `headings` and a `head` export to the tree. The pass only
//! warns, a broken link never fails the build.

mod ast;
mod frontmatter;
mod links;
mod slug;

pub use ast::Node;
pub use frontmatter::{Frontmatter, FrontmatterAttrs, frontmatter_to_head, parse_frontmatter};
pub use links::{LinkWarning, OsFs, SourceFs, is_local_href, normalize_path, rewrite_content_links};
pub use slug::{Slugger, slugify};

use crate::error::BuildError;
use micro_city::{ContentHeading, DocumentHead};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HEAD_EXPORT: &str = "head";
pub const HEADINGS_EXPORT: &str = "headings";

/// Frontmatter collected for every source file of the build, keyed by normalized path.
#[derive(Debug, Default)]
pub struct BuildContext {
    frontmatter: HashMap<PathBuf, FrontmatterAttrs>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_frontmatter(&mut self, source_path: impl AsRef<Path>, attrs: FrontmatterAttrs) {
        self.frontmatter.insert(normalize_path(source_path.as_ref()), attrs);
    }

    /// Parses the frontmatter of `source`, records it and returns the rest of the source.
    pub fn add_source<'a>(&mut self, source_path: impl AsRef<Path>, source: &'a str) -> Result<&'a str, BuildError> {
        let Frontmatter { attrs, body } = parse_frontmatter(source)?;
        if let Some(attrs) = attrs {
            self.insert_frontmatter(source_path, attrs);
        }
        Ok(body)
    }

    pub fn frontmatter(&self, source_path: &Path) -> Option<&FrontmatterAttrs> {
        self.frontmatter.get(&normalize_path(source_path))
    }
}

/// What [`transform`] found, so a host can bind it into a route module directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformReport {
    pub warnings: Vec<LinkWarning>,
    pub head: Option<DocumentHead>,
    pub headings: Vec<ContentHeading>,
}

pub fn transform(
    ctx: &BuildContext,
    fs: &dyn SourceFs,
    tree: &mut Node,
    source_path: &Path,
) -> Result<TransformReport, BuildError> {
    let source_path = normalize_path(source_path);

    let warnings = rewrite_content_links(tree, &source_path, fs);

    let head = ctx.frontmatter(&source_path).and_then(frontmatter_to_head);
    if let Some(head) = &head {
        export(tree, HEAD_EXPORT, head)?;
    }

    let headings = assign_heading_ids(tree);
    if !headings.is_empty() {
        export(tree, HEADINGS_EXPORT, &headings)?;
    }

    debug!(
        source = %source_path.display(),
        headings = headings.len(),
        has_head = head.is_some(),
        warnings = warnings.len(),
        "transformed content page"
    );
    Ok(TransformReport { warnings, head, headings })
}

/// Assigns a slug `id` to every heading that lacks one and lists them in document order.
fn assign_heading_ids(tree: &mut Node) -> Vec<ContentHeading> {
    let mut slugger = Slugger::new();
    let mut headings = Vec::new();

    tree.visit_elements_mut(&mut |node| {
        let Some(level) = node.heading_rank() else {
            return;
        };
        if node.has_property("id") {
            return;
        }
        let text = node.text_content();
        let id = slugger.slug(&text);
        node.set_property("id", id.as_str());
        headings.push(ContentHeading { text, id, level });
    });

    headings
}

fn export<T: Serialize>(tree: &mut Node, name: &'static str, value: &T) -> Result<(), BuildError> {
    let value = serde_json::to_value(value).map_err(|source| BuildError::Export { name, source })?;
    tree.unshift(Node::Export { name: name.to_string(), value });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::links::MockSourceFs;
    use micro_city::DocumentMeta;
    use serde_json::{Value, json};

    fn heading(tag: &str, text: &str) -> Node {
        Node::element(tag, vec![Node::text(text)])
    }

    fn context(path: &str, source: &str) -> BuildContext {
        let mut ctx = BuildContext::new();
        ctx.add_source(path, source).unwrap();
        ctx
    }

    #[test]
    fn test_headings_are_slugged_in_order() {
        let mut fs = MockSourceFs::new();
        fs.expect_exists().never();
        let mut tree = Node::root(vec![
            heading("h1", "Intro"),
            Node::element("p", vec![Node::text("text")]),
            heading("h2", "Intro"),
            heading("h3", "Intro"),
            heading("h2", "Custom").with_property("id", "keep-me"),
        ]);

        let report = transform(&BuildContext::new(), &fs, &mut tree, Path::new("/routes/index.md")).unwrap();

        let ids: Vec<_> = report.headings.iter().map(|h| (h.id.as_str(), h.level)).collect();
        assert_eq!(ids, [("intro", 1), ("intro-2", 2), ("intro-3", 3)]);
        assert_eq!(report.head, None);

        let children = tree.children();
        assert!(matches!(&children[0], Node::Export { name, .. } if name == HEADINGS_EXPORT));
        assert_eq!(children[1].property("id"), Some(&json!("intro")));
        assert_eq!(children[4].property("id"), Some(&json!("intro-3")));
        assert_eq!(children[5].property("id"), Some(&json!("keep-me")));
    }

    #[test]
    fn test_exports_head_and_headings() {
        let mut fs = MockSourceFs::new();
        fs.expect_exists().never();
        let ctx = context("/routes/docs/./index.md", "---\ntitle: Docs\ndescription: All of it\n---\n# Docs\n");
        let mut tree = Node::root(vec![heading("h1", "Docs")]);

        let report = transform(&ctx, &fs, &mut tree, Path::new("/routes/docs/index.md")).unwrap();

        let head = report.head.unwrap();
        assert_eq!(head.title.as_deref(), Some("Docs"));
        assert_eq!(head.meta, vec![DocumentMeta::name("description", "All of it")]);

        let names: Vec<_> = tree
            .children()
            .iter()
            .filter_map(|node| match node {
                Node::Export { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, [HEADINGS_EXPORT, HEAD_EXPORT]);
        assert_eq!(
            tree.export(HEAD_EXPORT),
            Some(&json!({ "title": "Docs", "meta": [{ "name": "description", "content": "All of it" }] }))
        );
        assert_eq!(tree.export(HEADINGS_EXPORT), Some(&json!([{ "text": "Docs", "id": "docs", "level": 1 }])));
    }

    #[test]
    fn test_no_exports_without_headings_or_frontmatter() {
        let mut fs = MockSourceFs::new();
        fs.expect_exists().never();
        let mut tree = Node::root(vec![Node::element("p", vec![Node::text("plain")])]);

        let report = transform(&BuildContext::new(), &fs, &mut tree, Path::new("/routes/plain.md")).unwrap();

        assert_eq!(report, TransformReport::default());
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.export(HEAD_EXPORT), None::<&Value>);
    }

    #[test]
    fn test_parser_nodes_survive_transform() {
        let mut fs = MockSourceFs::new();
        fs.expect_exists().never();
        let mut tree: Node = serde_json::from_value(json!({
            "type": "root",
            "children": [
                { "type": "doctype" },
                { "type": "element", "tagName": "h2", "children": [
                    { "type": "text", "value": "Setup " },
                    { "type": "raw", "value": "<br>" }
                ] }
            ]
        }))
        .unwrap();

        let report = transform(&BuildContext::new(), &fs, &mut tree, Path::new("/routes/index.md")).unwrap();

        assert_eq!(report.headings[0].id, "setup");
        let tree = serde_json::to_value(&tree).unwrap();
        assert_eq!(tree["children"][1], json!({ "type": "doctype" }));
        assert_eq!(tree["children"][2]["children"][1], json!({ "type": "raw", "value": "<br>" }));
    }

    #[test]
    fn test_broken_link_is_reported_not_fatal() {
        let mut fs = MockSourceFs::new();
        fs.expect_exists().returning(|path| path == Path::new("/routes/docs/routing.md"));
        let mut tree = Node::root(vec![
            Node::element("a", vec![]).with_property("href", "./routing.md"),
            Node::element("a", vec![]).with_property("href", "./gone.mdx"),
        ]);

        let report = transform(&BuildContext::new(), &fs, &mut tree, Path::new("/routes/docs/index.md")).unwrap();

        assert_eq!(tree.children()[0].property("href"), Some(&json!("./routing")));
        assert_eq!(tree.children()[1].property("href"), Some(&json!("./gone.mdx")));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].href, "./gone.mdx");
    }
}
