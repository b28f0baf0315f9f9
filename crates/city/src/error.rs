use std::error::Error;
use thiserror::Error;

/// Error type user handlers, loaders and renderers report through.
pub type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RouteTableError {
    #[error("invalid route template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("static route '{route}' is shadowed by the earlier route '{shadowed_by}'")]
    Shadowed { route: String, shadowed_by: String },
}

impl RouteTableError {
    pub fn invalid_template<T: ToString, R: ToString>(template: T, reason: R) -> Self {
        Self::InvalidTemplate { template: template.to_string(), reason: reason.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum BodyError {
    #[error("request body has been consumed")]
    Consumed,

    #[error("failed to read request body: {source}")]
    Read { source: BoxError },

    #[error("request body is not utf8")]
    NotUtf8,

    #[error("invalid json body: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid form body: {source}")]
    Form {
        #[from]
        source: serde_urlencoded::de::Error,
    },

    #[error("response stream has been closed")]
    StreamClosed,
}

#[derive(Error, Debug)]
pub enum CityError {
    #[error("failed to load route module: {source}")]
    ModuleLoad { source: BoxError },

    #[error("failed to load menu: {source}")]
    MenuLoad { source: BoxError },

    #[error("{source}")]
    Handler { source: BoxError },

    #[error("failed to serialize response body: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },

    #[error("handler panicked: {reason}")]
    Panic { reason: String },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache lookup failed: {reason}")]
    Lookup { reason: String },

    #[error("cache store failed: {reason}")]
    Store { reason: String },
}

impl CacheError {
    pub fn lookup<S: ToString>(reason: S) -> Self {
        Self::Lookup { reason: reason.to_string() }
    }

    pub fn store<S: ToString>(reason: S) -> Self {
        Self::Store { reason: reason.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum HandlerBuildError {
    #[error("plan must be set")]
    MissingPlan,
    #[error("renderer must be set")]
    MissingRenderer,
}
