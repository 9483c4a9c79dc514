//! Transport seam

use crate::{AbortSignal, FetchRequest, FetchResponse, NetError};
use std::future::Future;
use std::pin::Pin;

/// Future returned by [`Transport::fetch`]
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<FetchResponse, NetError>> + 'a>>;

/// Carries fetch requests. The navigation layer never talks to the network
/// directly; it goes through one of these.
pub trait Transport {
    /// Perform `request`. Implementations should return `NetError::Aborted`
    /// if `signal` fires before the response is complete.
    fn fetch(&self, request: FetchRequest, signal: AbortSignal) -> FetchFuture<'_>;
}
