//! veer Networking
//!
//! Locations, the fetch request/response pair shared by visits, form
//! submissions and frames, and the transports that carry them.

mod location;
mod request;
mod response;
mod abort;
mod transport;
mod http;
mod stub;
pub mod sse;

pub use location::{Location, LocationError};
pub use request::{FetchRequest, Method, RequestIdGenerator};
pub use response::FetchResponse;
pub use abort::AbortSignal;
pub use transport::{FetchFuture, Transport};
pub use http::{HttpTransport, DEFAULT_USER_AGENT};
pub use stub::{StubResponse, StubTransport};
pub use url::Url;

/// Media types accepted for navigations
pub const ACCEPT_HTML: &str = "text/html, application/xhtml+xml";

/// Media type of push-fragment (stream) responses
pub const STREAM_MIME_TYPE: &str = "text/vnd.veer-stream.html";

/// Correlation id sent with every request
pub const REQUEST_ID_HEADER: &str = "X-Veer-Request-Id";

/// Names the frame a request is scoped to
pub const FRAME_HEADER: &str = "Veer-Frame";

/// Network error
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] LocationError),

    #[error("Request aborted")]
    Aborted,

    #[error("HTTP client error: {0}")]
    Client(String),
}
