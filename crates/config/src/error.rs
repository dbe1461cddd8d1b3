/// Errors produced while loading or validating a [`crate::Config`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The YAML document could not be deserialized into the expected shape.
    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The file named on the command line could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// Path that was opened.
        path: std::path::PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// A server spec string did not match the `name:port:weight[ ...]` grammar.
    #[error("invalid server spec {spec:?} at byte {position}: {reason}")]
    ServerSpec {
        /// The offending spec string, verbatim.
        spec: String,
        /// Byte offset into `spec` where parsing failed.
        position: usize,
        /// Human-readable reason.
        reason: &'static str,
    },
    /// `hash` named something other than one of the twelve recognised
    /// hash algorithms.
    #[error("pool {pool:?}: unknown hash algorithm {hash:?}")]
    UnknownHash {
        /// Owning pool name.
        pool: String,
        /// The rejected value.
        hash: String,
    },
    /// `dist_type` named something other than `ketama`, `modula`,
    /// `random`, or `range`.
    #[error("pool {pool:?}: unknown distribution type {dist_type:?}")]
    UnknownDistType {
        /// Owning pool name.
        pool: String,
        /// The rejected value.
        dist_type: String,
    },
    /// A named collaborator pool (`gutter`, `peer`, `message_queue`, a
    /// downstream) does not exist in the same configuration document.
    #[error("pool {pool:?} references unknown pool {target:?} as {role}")]
    UnknownPoolReference {
        /// Owning pool name.
        pool: String,
        /// The missing pool's name.
        target: String,
        /// Which field made the reference (`"gutter"`, `"peer"`, ...).
        role: &'static str,
    },
    /// `pool.virtual = true` but no `downstreams` were configured, or
    /// vice versa.
    #[error("pool {pool:?}: virtual pools require downstreams, and vice versa")]
    VirtualPoolMisconfigured {
        /// Owning pool name.
        pool: String,
    },
    /// The range distributor's servers failed topology validation.
    #[error("pool {pool:?}: invalid range topology: {source}")]
    RangeTopology {
        /// Owning pool name.
        pool: String,
        /// Underlying validation failure.
        #[source]
        source: distributor::RangeBuildError,
    },
}
