/// Failures that can keep the reactor from starting or resolving its
/// configured backends; anything past startup is handled per-connection
/// instead of surfaced here.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A pool's `listen` address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The configured listen address.
        addr: String,
        /// The underlying bind failure.
        #[source]
        source: std::io::Error,
    },
    /// A configured server's hostname could not be resolved to an
    /// address at startup.
    #[error("failed to resolve {pool}'s server {server} ({host}:{port}): {source}")]
    Resolve {
        /// The pool the unresolvable server belongs to.
        pool: String,
        /// The server's display name.
        server: String,
        /// The hostname that failed to resolve.
        host: String,
        /// The port given alongside `host`.
        port: u16,
        /// The underlying resolution failure.
        #[source]
        source: std::io::Error,
    },
    /// A hostname resolved to no addresses at all.
    #[error("{pool}'s server {server} ({host}:{port}) resolved to no addresses")]
    NoAddress {
        /// The pool the server belongs to.
        pool: String,
        /// The server's display name.
        server: String,
        /// The hostname that resolved to nothing.
        host: String,
        /// The port given alongside `host`.
        port: u16,
    },
    /// Building a pool's initial distributor state failed.
    #[error("pool {pool}: {source}")]
    Pool {
        /// The offending pool's name.
        pool: String,
        /// The underlying pool-construction failure.
        #[source]
        source: pool::PoolError,
    },
    /// A pool's `servers[]` entries failed to parse at startup (config
    /// loading already validates this; this mirrors the same check
    /// against the already-loaded document).
    #[error("pool {pool}: {source}")]
    ServerSpec {
        /// The offending pool's name.
        pool: String,
        /// The underlying parse failure.
        #[source]
        source: config::ConfigError,
    },
    /// Waiting for the shutdown signal itself failed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}
