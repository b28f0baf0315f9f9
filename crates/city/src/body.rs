//! Request and response bodies.
//!
//! - [`OptionReqBody`]: a request body that can be consumed exactly once, shared by every
//!   handler of one request
//! - [`ResponseBody`]: the body of every response this crate produces, either a single chunk
//!   or a stream
//! - [`StreamWriter`] and [`stream_response`]: the streaming-writer contract platform
//!   adapters consume

use crate::error::{BodyError, BoxError};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use http::{HeaderMap, Response, StatusCode};
use http_body::Body as HttpBody;
use http_body::{Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;
use tracing::error;

const STREAM_BUFFER: usize = 16;

/// The request body type platform adapters hand to the pipeline.
pub type ReqBody = UnsyncBoxBody<Bytes, BoxError>;

/// Builds a [`ReqBody`] holding `bytes`.
pub fn full_body(bytes: impl Into<Bytes>) -> ReqBody {
    Full::new(bytes.into()).map_err(|never: Infallible| -> BoxError { match never {} }).boxed_unsync()
}

/// Builds an empty [`ReqBody`].
pub fn empty_body() -> ReqBody {
    Empty::<Bytes>::new().map_err(|never: Infallible| -> BoxError { match never {} }).boxed_unsync()
}

#[derive(Clone)]
pub struct OptionReqBody {
    inner: Arc<Mutex<Option<ReqBody>>>,
}

impl From<ReqBody> for OptionReqBody {
    fn from(body: ReqBody) -> Self {
        OptionReqBody { inner: Arc::new(Mutex::new(Some(body))) }
    }
}

impl fmt::Debug for OptionReqBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionReqBody").finish_non_exhaustive()
    }
}

impl OptionReqBody {
    pub async fn can_consume(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.is_some()
    }

    /// Takes the body and collects it, a second call fails with [`BodyError::Consumed`].
    pub async fn bytes(&self) -> Result<Bytes, BodyError> {
        let body = self.inner.lock().await.take().ok_or(BodyError::Consumed)?;
        body.collect().await.map(|collected| collected.to_bytes()).map_err(|source| BodyError::Read { source })
    }
}

pub struct ResponseBody {
    inner: Kind,
}

enum Kind {
    Once(Option<Bytes>),
    Stream(UnsyncBoxBody<Bytes, BoxError>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { inner: Kind::Once(None) }
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { inner: Kind::Once(Some(bytes)) }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes, Error = BoxError> + Send + 'static,
    {
        Self { inner: Kind::Stream(UnsyncBoxBody::new(body)) }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Kind::Once(bytes) => f.debug_tuple("ResponseBody::Once").field(bytes).finish(),
            Kind::Stream(_) => f.write_str("ResponseBody::Stream"),
        }
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        if value.is_empty() { Self::empty() } else { Self::once(Bytes::from(value)) }
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(value: Vec<u8>) -> Self {
        if value.is_empty() { Self::empty() } else { Self::once(Bytes::from(value)) }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() { Self::empty() } else { Self::once(bytes) }
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        if value.is_empty() { Self::empty() } else { Self::once(Bytes::from_static(value.as_bytes())) }
    }
}

impl HttpBody for ResponseBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().inner {
            Kind::Once(option_bytes) => Poll::Ready(option_bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(box_body) => Pin::new(box_body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Kind::Once(option_bytes) => option_bytes.is_none(),
            Kind::Stream(box_body) => box_body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Once(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            Kind::Stream(box_body) => box_body.size_hint(),
        }
    }
}

/// The write side of a streamed response body.
///
/// Dropping the writer, or calling [`StreamWriter::close`], ends the body.
#[derive(Debug, Clone)]
pub struct StreamWriter {
    sender: mpsc::Sender<Bytes>,
}

impl StreamWriter {
    /// Writes a text or binary chunk, waiting while the reader is behind.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), BodyError> {
        self.sender.send(chunk.into()).await.map_err(|_closed| BodyError::StreamClosed)
    }

    pub fn close(&mut self) {
        self.sender.close_channel();
    }
}

/// Builds a response whose body is produced by `body_writer`.
///
/// The writer runs on its own task so the response can be handed to the caller before the
/// body is complete; a writer failure is logged and ends the stream.
pub fn stream_response<F, Fut>(status: StatusCode, headers: HeaderMap, body_writer: F) -> Response<ResponseBody>
where
    F: FnOnce(StreamWriter) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel::<Bytes>(STREAM_BUFFER);

    tokio::spawn(async move {
        if let Err(e) = body_writer(StreamWriter { sender }).await {
            error!(cause = %e, "response body writer failed, stream closed");
        }
    });

    let frames = receiver.map(|chunk| Ok::<_, BoxError>(Frame::data(chunk)));
    let mut response = Response::new(ResponseBody::stream(StreamBody::new(frames)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
