use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("frontmatter block is not closed")]
    UnclosedFrontmatter,

    #[error("invalid frontmatter yaml: {source}")]
    Frontmatter {
        #[from]
        source: serde_yaml::Error,
    },

    #[error("frontmatter must be a mapping, found {found}")]
    FrontmatterNotMapping { found: &'static str },

    #[error("failed to serialize export '{name}': {source}")]
    Export { name: &'static str, source: serde_json::Error },

    #[error("route '{pathname}' is defined by both '{first}' and '{second}'")]
    DuplicateRoute { pathname: String, first: String, second: String },
}
