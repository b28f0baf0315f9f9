use crate::markdown::ast::Node;
use serde_json::Value;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const CONTENT_EXTENSIONS: [&str; 2] = [".mdx", ".md"];

/// The file system view the link pass checks link targets against.
#[cfg_attr(test, mockall::automock)]
pub trait SourceFs {
    fn exists(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl SourceFs for OsFs {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// A content link whose target file does not exist, left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkWarning {
    pub href: String,
    pub source_path: PathBuf,
    pub resolved: PathBuf,
}

impl fmt::Display for LinkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the link \"{}\", found within \"{}\", does not have a matching source file",
            self.href,
            self.source_path.display()
        )
    }
}

/// Rewrites local links to `.md`/`.mdx` files so they point at the route instead of the file.
pub fn rewrite_content_links(tree: &mut Node, source_path: &Path, fs: &dyn SourceFs) -> Vec<LinkWarning> {
    let base = source_path.parent().unwrap_or_else(|| Path::new(""));
    let mut warnings = Vec::new();

    tree.visit_elements_mut(&mut |node| {
        if !node.is_element("a") {
            return;
        }
        let Some(Value::String(href)) = node.property("href") else {
            return;
        };
        let href = href.trim().to_string();
        if !is_local_href(&href) {
            return;
        }
        let lower = href.to_ascii_lowercase();
        let Some(ext) = CONTENT_EXTENSIONS.iter().find(|ext| lower.ends_with(*ext)) else {
            return;
        };

        let resolved = normalize_path(&base.join(&href));
        if !fs.exists(&resolved) {
            let warning = LinkWarning { href, source_path: source_path.to_path_buf(), resolved };
            warn!(href = %warning.href, source = %warning.source_path.display(), "{warning}");
            warnings.push(warning);
            return;
        }

        let rewritten = &href[..href.len() - ext.len()];
        debug!(from = %href, to = rewritten, "rewrote content link");
        node.set_property("href", rewritten);
    });

    warnings
}

/// Whether `href` points into the site rather than at a fragment or another origin.
pub fn is_local_href(href: &str) -> bool {
    let href = href.to_ascii_lowercase();
    !(href.is_empty()
        || href.starts_with('#')
        || href.starts_with("https://")
        || href.starts_with("http://")
        || href.starts_with("about:"))
}

/// Resolves `.` and `..` components without touching the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn link(href: &str) -> Node {
        Node::element("a", vec![Node::text("link")]).with_property("href", href)
    }

    fn href(node: &Node) -> &str {
        node.property("href").and_then(Value::as_str).unwrap_or_default()
    }

    #[test]
    fn test_local_href() {
        assert!(is_local_href("./guide.md"));
        assert!(is_local_href("/docs/guide"));
        assert!(!is_local_href(""));
        assert!(!is_local_href("#install"));
        assert!(!is_local_href("HTTPS://example.com/a.md"));
        assert!(!is_local_href("http://example.com/a.md"));
        assert!(!is_local_href("about:blank"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/docs/guide/./../intro.md")), PathBuf::from("/docs/intro.md"));
        assert_eq!(normalize_path(Path::new("docs/../../a.md")), PathBuf::from("../a.md"));
        assert_eq!(normalize_path(Path::new("/../a.md")), PathBuf::from("/a.md"));
    }

    #[test]
    fn test_rewrites_existing_target() {
        let mut fs = MockSourceFs::new();
        fs.expect_exists().with(eq(PathBuf::from("/routes/docs/foo.mdx"))).times(1).return_const(true);

        let mut tree = Node::root(vec![Node::element("p", vec![link(" ./foo.mdx ")])]);
        let warnings = rewrite_content_links(&mut tree, Path::new("/routes/docs/index.mdx"), &fs);

        assert!(warnings.is_empty());
        assert_eq!(href(&tree.children()[0].children()[0]), "./foo");
    }

    #[test]
    fn test_missing_target_is_left_unchanged() {
        let mut fs = MockSourceFs::new();
        fs.expect_exists().with(eq(PathBuf::from("/routes/guide/setup.MD"))).return_const(false);

        let mut tree = Node::root(vec![link("../guide/setup.MD")]);
        let warnings = rewrite_content_links(&mut tree, Path::new("/routes/docs/index.md"), &fs);

        assert_eq!(href(&tree.children()[0]), "../guide/setup.MD");
        assert_eq!(
            warnings,
            vec![LinkWarning {
                href: "../guide/setup.MD".into(),
                source_path: PathBuf::from("/routes/docs/index.md"),
                resolved: PathBuf::from("/routes/guide/setup.MD"),
            }]
        );
    }

    #[test]
    fn test_ignores_other_links() {
        let mut fs = MockSourceFs::new();
        fs.expect_exists().never();

        let mut tree = Node::root(vec![
            link("https://example.com/readme.md"),
            link("#intro"),
            link("./about"),
            link("./notes.md#top"),
            Node::element("img", vec![]).with_property("href", "./a.md"),
        ]);
        let before = tree.clone();
        let warnings = rewrite_content_links(&mut tree, Path::new("/routes/index.md"), &fs);

        assert!(warnings.is_empty());
        assert_eq!(tree, before);
    }
}
