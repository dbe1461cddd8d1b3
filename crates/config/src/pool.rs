use serde::Deserialize;

use crate::error::ConfigError;
use crate::server_spec::ServerSpec;

/// Which of the four dispatch algorithms a pool uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistType {
    /// Consistent hashing over an MD5-derived ring.
    Ketama,
    /// `hash % n`.
    Modula,
    /// Uniform random pick.
    Random,
    /// Static keyspace partitioning.
    Range,
}

/// A `downstreams[]` entry on a `virtual` pool: maps a hash-tag namespace
/// to a concrete pool by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownstreamConfig {
    /// Name of the concrete pool this namespace routes to.
    pub name: String,
    /// The namespace string extracted from the key's hash-tag.
    pub ns: String,
}

fn default_timeout_ms() -> u64 {
    400
}

fn default_backlog() -> u32 {
    1024
}

fn default_client_connections() -> u32 {
    0
}

fn default_server_connections() -> u32 {
    1
}

fn default_server_failure_limit() -> u32 {
    2
}

fn default_server_retry_timeout_ms() -> u64 {
    30_000
}

/// Rate-limit sentinel: both `rate` and `burst` at this value disables
/// the limiter entirely.
pub const RATE_LIMIT_DISABLED: f64 = 0.0;

/// One pool as read from the configuration document, prior to resolving
/// cross-pool references (`gutter`, `peer`, `message_queue`, downstream
/// names) against sibling pools.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Address the proxy listens on for this pool (`host:port`).
    pub listen: String,
    /// Distribution algorithm.
    pub dist_type: DistType,
    /// Routing-key hash function name; validated against
    /// [`hashkit::HashAlgorithm::parse`] at load time.
    #[serde(default = "default_hash")]
    pub hash: String,
    /// Two-character key delimiter pair (e.g. `"{}"`) used to extract a
    /// hash-tag; `None` hashes the whole key.
    #[serde(default)]
    pub hash_tag: Option<String>,
    /// Per-request timeout, milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Listen socket backlog.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Max simultaneous client connections; `0` means unlimited.
    #[serde(default = "default_client_connections")]
    pub client_connections: u32,
    /// Persistent connections maintained per backend server.
    #[serde(default = "default_server_connections")]
    pub server_connections: u32,
    /// Consecutive failures before a server is ejected.
    #[serde(default = "default_server_failure_limit")]
    pub server_failure_limit: u32,
    /// How long an ejected server stays out before being retried, ms.
    #[serde(default = "default_server_retry_timeout_ms")]
    pub server_retry_timeout_ms: u64,
    /// Whether failing servers are ejected at all.
    #[serde(default)]
    pub auto_eject_hosts: bool,
    /// Whether to open all server connections at pool init rather than
    /// lazily on first use.
    #[serde(default)]
    pub preconnect: bool,
    /// `true` for Redis RESP, `false` for memcached ASCII.
    #[serde(default)]
    pub redis: bool,
    /// Whether ejected servers are periodically probed for recovery.
    #[serde(default)]
    pub auto_probe_hosts: bool,
    /// Whether cold-server warm-up (peer mirroring) is enabled.
    #[serde(default)]
    pub auto_warmup: bool,
    /// Name of a sibling pool used as gutter failover.
    #[serde(default)]
    pub gutter: Option<String>,
    /// Name of a sibling pool used as a warm-up peer.
    #[serde(default)]
    pub peer: Option<String>,
    /// Name of a sibling pool that receives `delete` notifications.
    #[serde(default)]
    pub message_queue: Option<String>,
    /// Requests per second the token bucket refills; `0.0` alongside
    /// `burst == 0.0` disables rate limiting.
    #[serde(default)]
    pub rate: f64,
    /// Token bucket capacity.
    #[serde(default)]
    pub burst: f64,
    /// Whether this pool routes by namespace instead of owning servers.
    #[serde(default)]
    pub virtual_pool: bool,
    /// Hash-tag-derived namespace this pool serves, when it is itself a
    /// downstream target of a virtual pool.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Namespace → pool-name routing table, required when `virtual_pool`.
    #[serde(default)]
    pub downstreams: Vec<DownstreamConfig>,
    /// Backend server specs, `name:port:weight[ ...]`.
    #[serde(default)]
    pub servers: Vec<String>,
}

fn default_hash() -> String {
    "fnv1a_32".to_string()
}

impl PoolConfig {
    /// Parses every entry of [`Self::servers`] with [`ServerSpec::parse`].
    pub fn parsed_servers(&self) -> Result<Vec<ServerSpec>, ConfigError> {
        self.servers.iter().map(|s| ServerSpec::parse(s)).collect()
    }

    /// Whether the rate limiter is active for this pool.
    #[must_use]
    pub fn rate_limit_enabled(&self) -> bool {
        !(self.rate == RATE_LIMIT_DISABLED && self.burst == RATE_LIMIT_DISABLED)
    }
}
