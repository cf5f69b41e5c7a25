//! Network transport abstraction.

use std::future::Future;

/// Sends prepared requests over the network.
///
/// The cache never talks to the network itself: on a miss, a stale hit or a
/// revalidation it hands the (possibly conditional) request to a transport.
///
/// # Examples
///
/// ```rust,ignore
/// use httpstash_core::Transport;
/// use std::future::Ready;
///
/// #[derive(Clone)]
/// struct StaticTransport {
///     response: MyResponse,
/// }
///
/// impl Transport<MyRequest> for StaticTransport {
///     type Response = Result<MyResponse, std::io::Error>;
///     type Future = Ready<Self::Response>;
///
///     fn send(&mut self, _request: MyRequest) -> Self::Future {
///         std::future::ready(Ok(self.response.clone()))
///     }
/// }
/// ```
pub trait Transport<Req> {
    /// Outcome of sending a request, usually a `Result`.
    type Response;

    /// Future resolving to the outcome.
    type Future: Future<Output = Self::Response> + Send;

    /// Sends the request.
    fn send(&mut self, request: Req) -> Self::Future;
}
