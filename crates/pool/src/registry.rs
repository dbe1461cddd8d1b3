//! Cross-pool routing: gutter failover, peer warm-up, and virtual
//! (namespace) pools.

use std::collections::HashMap;

use crate::error::PoolError;
use crate::pool::Pool;

/// Extra work the caller must perform alongside a routing decision:
/// mirroring a cold-server read to its peer and writing the result back.
#[derive(Debug, Clone, Copy)]
pub struct WarmupPlan {
    /// Index, within the *original* pool, of the cold server the write-
    /// back eventually targets.
    pub origin_index: usize,
}

/// The outcome of resolving a key to a server to actually connect to.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    /// Name of the pool whose connection pool the request is sent
    /// through (may differ from the namespace's owning pool under
    /// gutter or peer failover).
    pub pool_name: String,
    /// Server index within that pool.
    pub server_index: usize,
    /// Present when the chosen server is a peer standing in for a cold
    /// primary; the caller mirrors the request to `origin_index` and,
    /// on a cache hit, writes the value back there as `set ... noreply`.
    pub warmup: Option<WarmupPlan>,
}

/// All configured pools, keyed by name, with the cross-pool routing
/// rules (virtual namespaces, gutter, peer) layered on top of each
/// pool's own [`Pool::dispatch`].
#[derive(Debug, Default)]
pub struct Registry {
    pools: HashMap<String, Pool>,
    /// Virtual pools' namespace → downstream pool-name table.
    downstreams: HashMap<String, HashMap<String, String>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a concrete (non-virtual) pool.
    pub fn insert(&mut self, pool: Pool) {
        self.pools.insert(pool.name.clone(), pool);
    }

    /// Registers a virtual pool's namespace routing table.
    pub fn insert_virtual(&mut self, name: impl Into<String>, downstreams: HashMap<String, String>) {
        self.downstreams.insert(name.into(), downstreams);
    }

    /// Mutable access to one pool, for failure/success/probe bookkeeping.
    pub fn pool_mut(&mut self, name: &str) -> Option<&mut Pool> {
        self.pools.get_mut(name)
    }

    /// Immutable access to one pool.
    #[must_use]
    pub fn pool(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name)
    }

    /// Resolves a virtual pool's hash-tagged namespace to a concrete
    /// downstream pool name.
    pub fn resolve_namespace(&self, virtual_pool: &str, namespace: Option<&str>) -> Result<&str, PoolError> {
        let namespace = namespace.ok_or_else(|| PoolError::MissingNamespace {
            pool: virtual_pool.to_string(),
        })?;
        self.downstreams
            .get(virtual_pool)
            .and_then(|table| table.get(namespace))
            .map(String::as_str)
            .ok_or_else(|| PoolError::UnknownNamespace {
                pool: virtual_pool.to_string(),
                namespace: namespace.to_string(),
            })
    }

    /// Routes `key` (already resolved to a concrete, non-virtual, pool
    /// name) to a server, applying gutter failover and peer warm-up.
    /// `write` selects the read or write tag lane for a range-distributed
    /// pool; other distributors ignore it.
    pub fn route(
        &mut self,
        pool_name: &str,
        key: &[u8],
        write: bool,
        now: u64,
        rng: &mut impl rand::Rng,
    ) -> Result<RouteOutcome, PoolError> {
        let (hash, gutter, peer, auto_warmup) = {
            let pool = self
                .pools
                .get(pool_name)
                .ok_or_else(|| PoolError::UnknownNamespace {
                    pool: pool_name.to_string(),
                    namespace: String::new(),
                })?;
            (pool.hash_key(key), pool.gutter.clone(), pool.peer.clone(), pool.auto_warmup)
        };

        let primary = self
            .pools
            .get_mut(pool_name)
            .expect("checked above")
            .dispatch(hash, write, now, rng);

        let (routed_pool, index) = match primary {
            Ok(index) => (pool_name.to_string(), index),
            Err(PoolError::ServiceUnavailable) => {
                let gutter_name = gutter.ok_or(PoolError::ServiceUnavailable)?;
                let gutter_pool = self
                    .pools
                    .get_mut(&gutter_name)
                    .ok_or(PoolError::ServiceUnavailable)?;
                let index = gutter_pool.dispatch(hash, write, now, rng)?;
                (gutter_name, index)
            }
            Err(other) => return Err(other),
        };

        if auto_warmup && routed_pool == pool_name {
            let is_cold = self.pools[&routed_pool].servers[index].stats.cold;
            if is_cold {
                if let Some(peer_name) = peer {
                    if let Some(peer_pool) = self.pools.get_mut(&peer_name) {
                        let peer_index = peer_pool.dispatch(hash, write, now, rng)?;
                        return Ok(RouteOutcome {
                            pool_name: peer_name,
                            server_index: peer_index,
                            warmup: Some(WarmupPlan { origin_index: index }),
                        });
                    }
                }
            }
        }

        Ok(RouteOutcome {
            pool_name: routed_pool,
            server_index: index,
            warmup: None,
        })
    }
}
