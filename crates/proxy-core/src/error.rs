/// Errors surfaced across a request's lifetime: parse failures, routing
/// failures, and the transport/timeout conditions that close a server
/// connection.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ProxyError {
    /// The client or server stream produced bytes that did not form a
    /// valid message in the pool's configured protocol.
    #[error(transparent)]
    Parse(#[from] protocol::ParseError),
    /// No server (including any gutter fallback) was reachable for this
    /// request.
    #[error("no server available")]
    ServiceUnavailable,
    /// The pool's rate limiter rejected this request.
    #[error("too many requests")]
    TooManyRequests,
    /// A request referenced a handle whose generation no longer matches
    /// the arena slot it occupies — the message or connection it named
    /// has already been freed and the slot reused.
    #[error("stale handle")]
    StaleHandle,
    /// A virtual pool's hash-tag did not resolve to a configured
    /// downstream.
    #[error(transparent)]
    Pool(#[from] pool::PoolError),
    /// A server connection's in-flight request exceeded the pool's
    /// configured timeout.
    #[error("request timed out")]
    Timeout,
}
