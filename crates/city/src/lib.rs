//! A file-driven route resolver and request pipeline.
//!
//! A [`CityPlan`] holds the ordered route table compiled at build time. For every request
//! [`CityHandler`] matches the pathname, runs the handlers of the matched layouts and page
//! (see [`RequestEvent`]), and answers with a redirect, a JSON data response, or a document
//! streamed by the host's [`Renderer`]. [`CachedHandler`] adds an optional read-through cache.

mod body;
mod content;
mod handler;
mod head;
mod method;
mod module;
mod output;
mod request;
mod server;

pub mod cache;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod router;

pub use body::{OptionReqBody, ReqBody, ResponseBody, StreamWriter, empty_body, full_body, stream_response};
pub use cache::{CacheKey, CachedHandler, CachedResponse, ResponseCache, TokioWaitUntil, WaitUntil};
pub use content::{ContentHeading, ContentMenu, ContentState};
pub use error::BoxError;
pub use handler::{EndpointHandler, FnHandler, handler_fn};
pub use head::{
    DocumentHead, DocumentHeadProps, DocumentLink, DocumentMeta, DocumentStyle, HeadExport, ResolvedDocumentHead,
    resolve_head,
};
pub use method::{HttpMethod, MethodHandlers};
pub use module::{
    FnLoader, MenuLoader, ModuleLoader, RouteModule, RouteModuleBuilder, loader_fn, ready_menu, ready_module,
};
pub use output::{DeferredRejection, HandlerOutput, IntoHandlerOutput, Json, ResolvedBody};
pub use pipeline::{EndpointResponse, Outcome, Pipeline, RequestEvent};
pub use render::{RenderRequest, Renderer};
pub use request::{RequestContext, ResponseContext, RouteLocation, RouteParams};
pub use router::{CityPlan, CityPlanBuilder, RouteType};
pub use server::{CityHandler, CityHandlerBuilder, RequestHandler};
