//! Handler return values and the single step that resolves them into a body.
//!
//! A handler either answers directly ([`HandlerOutput::Immediate`]) or hands back a producer
//! ([`HandlerOutput::Deferred`]) that runs after the chain finished, so headers and status can
//! be set synchronously while the expensive part of the body is computed later.

use crate::body::StreamWriter;
use crate::error::BoxError;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::warn;

pub type DeferredProducer = Box<dyn FnOnce() -> BoxFuture<'static, Result<Value, BoxError>> + Send>;
pub type StreamProducer = Box<dyn FnOnce(StreamWriter) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Serializes the wrapped value as the handler body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

pub enum HandlerOutput {
    /// Leaves the body set by earlier handlers untouched.
    Empty,
    Immediate(Value),
    /// Invoked at most once, after the chain completed.
    Deferred(DeferredProducer),
    /// Writes the body itself, only meaningful for data responses.
    Stream(StreamProducer),
}

impl HandlerOutput {
    pub fn deferred<F, Fut, T, E>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize,
        E: Into<BoxError>,
    {
        HandlerOutput::Deferred(Box::new(move || {
            Box::pin(async move {
                let value = f().await.map_err(Into::into)?;
                Ok(serde_json::to_value(value)?)
            })
        }))
    }

    pub fn stream<F, Fut>(f: F) -> Self
    where
        F: FnOnce(StreamWriter) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        HandlerOutput::Stream(Box::new(move |writer| Box::pin(f(writer))))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, HandlerOutput::Empty)
    }

    /// Resolves both the immediate and the deferred form into a [`ResolvedBody`].
    ///
    /// A failing producer does not fail the request, it yields [`ResolvedBody::Rejected`].
    pub async fn resolve(self) -> ResolvedBody {
        match self {
            HandlerOutput::Empty => ResolvedBody::Empty,
            HandlerOutput::Immediate(value) => ResolvedBody::Value(value),
            HandlerOutput::Deferred(producer) => match producer().await {
                Ok(value) => ResolvedBody::Value(value),
                Err(e) => {
                    warn!(cause = %e, "deferred body rejected");
                    ResolvedBody::Rejected(DeferredRejection { reason: e.to_string() })
                }
            },
            HandlerOutput::Stream(producer) => ResolvedBody::Stream(producer),
        }
    }
}

impl fmt::Debug for HandlerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerOutput::Empty => f.write_str("Empty"),
            HandlerOutput::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            HandlerOutput::Deferred(_) => f.write_str("Deferred"),
            HandlerOutput::Stream(_) => f.write_str("Stream"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("deferred body rejected: {reason}")]
pub struct DeferredRejection {
    pub reason: String,
}

pub enum ResolvedBody {
    Empty,
    Value(Value),
    Stream(StreamProducer),
    Rejected(DeferredRejection),
}

impl ResolvedBody {
    /// The body as resolved data for the renderer, `null` when there is none.
    pub fn into_data(self) -> Result<Value, DeferredRejection> {
        match self {
            ResolvedBody::Empty => Ok(Value::Null),
            ResolvedBody::Value(value) => Ok(value),
            ResolvedBody::Stream(_) => {
                warn!("a stream body can not be passed as page data, using null");
                Ok(Value::Null)
            }
            ResolvedBody::Rejected(rejection) => Err(rejection),
        }
    }
}

impl fmt::Debug for ResolvedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedBody::Empty => f.write_str("Empty"),
            ResolvedBody::Value(value) => f.debug_tuple("Value").field(value).finish(),
            ResolvedBody::Stream(_) => f.write_str("Stream"),
            ResolvedBody::Rejected(rejection) => f.debug_tuple("Rejected").field(rejection).finish(),
        }
    }
}

/// Types a handler closure may return.
pub trait IntoHandlerOutput {
    fn into_output(self) -> Result<HandlerOutput, BoxError>;
}

impl IntoHandlerOutput for HandlerOutput {
    fn into_output(self) -> Result<HandlerOutput, BoxError> {
        Ok(self)
    }
}

impl IntoHandlerOutput for () {
    fn into_output(self) -> Result<HandlerOutput, BoxError> {
        Ok(HandlerOutput::Empty)
    }
}

impl IntoHandlerOutput for Value {
    fn into_output(self) -> Result<HandlerOutput, BoxError> {
        Ok(HandlerOutput::Immediate(self))
    }
}

impl IntoHandlerOutput for String {
    fn into_output(self) -> Result<HandlerOutput, BoxError> {
        Ok(HandlerOutput::Immediate(Value::String(self)))
    }
}

impl IntoHandlerOutput for &'static str {
    fn into_output(self) -> Result<HandlerOutput, BoxError> {
        Ok(HandlerOutput::Immediate(Value::from(self)))
    }
}

impl<T: Serialize> IntoHandlerOutput for Json<T> {
    fn into_output(self) -> Result<HandlerOutput, BoxError> {
        Ok(HandlerOutput::Immediate(serde_json::to_value(self.0)?))
    }
}

/// `None` sets an explicit `null` body.
impl<T: IntoHandlerOutput> IntoHandlerOutput for Option<T> {
    fn into_output(self) -> Result<HandlerOutput, BoxError> {
        match self {
            Some(t) => t.into_output(),
            None => Ok(HandlerOutput::Immediate(Value::Null)),
        }
    }
}

impl<T: IntoHandlerOutput, E: Into<BoxError>> IntoHandlerOutput for Result<T, E> {
    fn into_output(self) -> Result<HandlerOutput, BoxError> {
        self.map_err(Into::into)?.into_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_immediate_and_deferred_resolve_alike() {
        let immediate = Json(json!({"a": 1})).into_output().unwrap().resolve().await;
        let deferred = HandlerOutput::deferred(|| async { Ok::<_, BoxError>(json!({"a": 1})) }).resolve().await;

        assert!(matches!(immediate, ResolvedBody::Value(ref v) if *v == json!({"a": 1})));
        assert!(matches!(deferred, ResolvedBody::Value(ref v) if *v == json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_deferred_runs_once_and_rejection_is_captured() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let output = HandlerOutput::deferred(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<Value, _>("db down")
        });

        let resolved = output.resolve().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolved.into_data(), Err(DeferredRejection { reason: "db down".into() }));
    }

    #[test]
    fn test_none_is_null_and_unit_is_empty() {
        assert!(matches!(None::<Value>.into_output().unwrap(), HandlerOutput::Immediate(Value::Null)));
        assert!(().into_output().unwrap().is_empty());
    }

    #[test]
    fn test_result_err_propagates() {
        let result: Result<Value, BoxError> = Err("boom".into());
        assert_eq!(result.into_output().unwrap_err().to_string(), "boom");
    }
}
