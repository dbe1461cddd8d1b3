//! Turns a validated [`config::Config`] into the pieces the reactor
//! needs: a fully populated [`pool::Registry`], the per-pool
//! [`PoolRuntime`] map [`proxy_core::engine::Engine`] consults for
//! routing metadata, and the `(pool, server index) -> SocketAddr` table
//! [`TokioConnector`] resolves backend connects against.
//!
//! DNS resolution happens once here, synchronously, before the reactor
//! starts accepting: `config::PoolConfig::servers` names are resolved
//! with the standard library's blocking resolver rather than
//! `tokio::net::lookup_host`, since this runs before the event loop has
//! any connections to keep servicing and a config with unresolvable
//! backends should fail startup immediately rather than admit clients
//! first.

use std::collections::HashMap;
use std::net::{SocketAddr, ToSocketAddrs};

use config::Config;
use pool::{Pool, Registry};
use proxy_core::engine::PoolRuntime;
use proxy_core::protocol::Protocol;

use crate::connector::TokioConnector;
use crate::error::ServerError;

/// Everything [`crate::run`] needs to start accepting: the routing
/// registry, per-pool runtime metadata, and a connector over every
/// concrete pool's resolved servers.
pub struct Topology {
    /// The populated routing registry.
    pub registry: Registry,
    /// Per-pool routing metadata, keyed by pool name (virtual pools
    /// included, so `Engine::resolve_concrete_pool` can look up a
    /// client's listening pool regardless of kind).
    pub runtimes: HashMap<String, PoolRuntime>,
    /// A connector ready to open any concrete pool's backend servers.
    pub connector: TokioConnector,
    /// Every pool's listen address and wire protocol, for the accept
    /// loops to bind.
    pub listeners: Vec<(String, Protocol, String)>,
}

/// `{`/`}`-style two-byte hash-tag delimiters, parsed from
/// [`config::PoolConfig::hash_tag`].
fn parse_hash_tag(raw: &str) -> Option<(u8, u8)> {
    let bytes = raw.as_bytes();
    (bytes.len() == 2).then(|| (bytes[0], bytes[1]))
}

fn resolve_server(pool: &str, spec: &config::ServerSpec) -> Result<SocketAddr, ServerError> {
    let query = format!("{}:{}", spec.name, spec.port);
    let mut addrs = query.to_socket_addrs().map_err(|source| ServerError::Resolve {
        pool: pool.to_string(),
        server: spec.name.clone(),
        host: spec.name.clone(),
        port: spec.port,
        source,
    })?;
    addrs.next().ok_or_else(|| ServerError::NoAddress {
        pool: pool.to_string(),
        server: spec.name.clone(),
        host: spec.name.clone(),
        port: spec.port,
    })
}

/// Builds the reactor's routing topology from a validated configuration
/// document.
pub fn build(config: &Config) -> Result<Topology, ServerError> {
    let mut registry = Registry::new();
    let mut runtimes = HashMap::new();
    let mut addrs = HashMap::new();
    let mut listeners = Vec::new();

    for (name, pool_config) in config.pools() {
        let protocol = Protocol::from_redis_flag(pool_config.redis);
        listeners.push((name.to_string(), protocol, pool_config.listen.clone()));

        runtimes.insert(
            name.to_string(),
            PoolRuntime {
                protocol,
                // Stored in the same wall-clock unit `Engine`'s `now`
                // uses (microseconds): `req_forward` schedules a
                // request's timeout as `now + runtime.timeout_ms`
                // directly, and `now` is microseconds throughout so
                // this pool's deadlines stay in the unit `pool::Server`
                // and the timeout wheel already compare against.
                timeout_ms: pool_config.timeout_ms * 1000,
                hash_tag: pool_config.hash_tag.as_deref().and_then(parse_hash_tag),
                message_queue: pool_config.message_queue.clone(),
                is_virtual: pool_config.virtual_pool,
            },
        );

        if pool_config.virtual_pool {
            let downstreams = pool_config.downstreams.iter().map(|d| (d.ns.clone(), d.name.clone())).collect();
            registry.insert_virtual(name, downstreams);
            continue;
        }

        let specs = pool_config.parsed_servers().map_err(|source| ServerError::ServerSpec { pool: name.to_string(), source })?;
        let mut resolved = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let addr = resolve_server(name, spec)?;
            addrs.insert((name.to_string(), index), addr);
            resolved.push(addr);
        }

        let built = Pool::build(name.to_string(), pool_config, &resolved).map_err(|source| ServerError::Pool { pool: name.to_string(), source })?;
        registry.insert(built);
    }

    Ok(Topology { registry, runtimes, connector: TokioConnector::new(addrs), listeners })
}
