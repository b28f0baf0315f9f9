//! Build-time companion of `micro-city`.
//!
//! [`markdown::transform`] prepares parsed content pages: local links to other content files
//! are rewritten to their routes, headings get unique ids, and the frontmatter and headings
//! are exported as `head` and `headings`. [`routes::build_manifest`] turns the discovered
//! source files into the ordered route, fallback and menu tables a `CityPlan` is built from.

pub mod error;
pub mod markdown;
pub mod routes;

pub use error::BuildError;
pub use markdown::{BuildContext, Node, OsFs, SourceFs, TransformReport, transform};
pub use routes::{ManifestMenu, ManifestRoute, RouteManifest, RouteSource, SourceKind, build_manifest, parse_source_path};
