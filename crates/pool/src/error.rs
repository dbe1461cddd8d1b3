/// Errors raised while dispatching or maintaining a server pool.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PoolError {
    /// Every candidate server for this key (including gutter failover,
    /// where configured) is currently ejected.
    #[error("no server available")]
    ServiceUnavailable,
    /// The pool's rate limiter rejected this request.
    #[error("too many requests")]
    TooManyRequests,
    /// A hash-tagged namespace did not match any configured downstream.
    #[error("unknown namespace {namespace:?} on virtual pool {pool:?}")]
    UnknownNamespace {
        /// The owning virtual pool's name.
        pool: String,
        /// The namespace extracted from the key's hash-tag.
        namespace: String,
    },
    /// A key arrived at a virtual pool without a hash-tag, so no
    /// namespace could be extracted.
    #[error("virtual pool {pool:?} requires a hash-tagged key")]
    MissingNamespace {
        /// The owning virtual pool's name.
        pool: String,
    },
    /// Building the pool's distributor failed (propagated from the
    /// `distributor` crate).
    #[error(transparent)]
    Range(#[from] distributor::RangeBuildError),
}
