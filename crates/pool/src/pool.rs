//! A single server pool: its servers, distributor, and rebuild/rate-limit
//! state. DNS resolution is not this crate's concern — the proxy core
//! consumes a `Transport` capability, so [`Pool::build`] takes
//! already-resolved addresses, aligned by index with
//! [`config::PoolConfig::parsed_servers`].

use std::net::SocketAddr;

use config::{DistType, PoolConfig};
use distributor::{ketama, Continuum, Distributor, RangeServer, RangeTopology};

use crate::error::PoolError;
use crate::rate_limit::RateLimiter;
use crate::server::Server;

/// A named shard group: servers, routing strategy, and the mutable
/// failure/rebuild/rate-limit state the reactor consults on every
/// dispatch.
#[derive(Debug)]
pub struct Pool {
    /// The pool's name, as keyed in the configuration document.
    pub name: String,
    /// Backend servers, indexed identically to the distributor's view
    /// of them.
    pub servers: Vec<Server>,
    /// Current dispatch strategy.
    distributor: Distributor,
    hash: hashkit::HashAlgorithm,
    dist_type: DistType,
    auto_eject_hosts: bool,
    /// Whether ejected servers are actively reprobed.
    pub auto_probe_hosts: bool,
    /// Whether cold-server mirroring is enabled for this pool.
    pub auto_warmup: bool,
    server_failure_limit: u32,
    server_retry_timeout_usec: u64,
    /// Earliest wall-clock microseconds at which a rebuild is due;
    /// `0` means no ejection is pending.
    next_rebuild: u64,
    /// Token bucket, present only when the pool's configuration enables
    /// rate limiting.
    pub rate_limiter: Option<RateLimiter>,
    /// Sibling pool name used as gutter failover, if configured.
    pub gutter: Option<String>,
    /// Sibling pool name used as a warm-up peer, if configured.
    pub peer: Option<String>,
    /// Sibling pool name notified on `delete`, if configured.
    pub message_queue: Option<String>,
}

impl Pool {
    /// Builds a pool's servers and initial distributor state from its
    /// configuration and pre-resolved addresses.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Range`] if `dist_type == Range` and the
    /// server set fails range-topology validation (config-load time
    /// already performs this same check; this is the runtime mirror
    /// used when a pool is rebuilt after an admin update).
    pub fn build(
        name: String,
        config: &PoolConfig,
        resolved: &[SocketAddr],
    ) -> Result<Self, PoolError> {
        let specs = config
            .parsed_servers()
            .map_err(|_| PoolError::ServiceUnavailable)?;
        debug_assert_eq!(specs.len(), resolved.len());

        let servers: Vec<Server> = specs
            .iter()
            .zip(resolved.iter())
            .enumerate()
            .map(|(index, (spec, addr))| Server {
                index,
                name: spec.name.clone(),
                ketama_name: spec.ketama_name(),
                addr: *addr,
                weight: spec.weight.max(1),
                failure_count: 0,
                next_retry: 0,
                next_probe: 0,
                stats: crate::server::ServerStats::default(),
            })
            .collect();

        let hash = hashkit::HashAlgorithm::parse(&config.hash).unwrap_or_default();
        let rate_limiter = config
            .rate_limit_enabled()
            .then(|| RateLimiter::new(config.rate, config.burst));

        let mut pool = Self {
            name: name.clone(),
            servers,
            distributor: Distributor::Modula(Continuum::default()),
            hash,
            dist_type: config.dist_type,
            auto_eject_hosts: config.auto_eject_hosts,
            auto_probe_hosts: config.auto_probe_hosts,
            auto_warmup: config.auto_warmup,
            server_failure_limit: config.server_failure_limit,
            server_retry_timeout_usec: config.server_retry_timeout_ms * 1000,
            next_rebuild: 0,
            rate_limiter,
            gutter: config.gutter.clone(),
            peer: config.peer.clone(),
            message_queue: config.message_queue.clone(),
        };

        if config.dist_type == DistType::Range {
            pool.distributor = Distributor::Range(pool.build_range_topology(&specs)?);
        } else {
            pool.rebuild(0, true);
        }
        Ok(pool)
    }

    fn build_range_topology(&self, specs: &[config::ServerSpec]) -> Result<RangeTopology, PoolError> {
        let range_servers: Vec<RangeServer> = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| spec.to_range_server(index))
            .collect();
        Ok(RangeTopology::build(range_servers, &self.name, false)?)
    }

    /// Hashes `key` with the pool's configured algorithm.
    #[must_use]
    pub fn hash_key(&self, key: &[u8]) -> u32 {
        self.hash.hash(key)
    }

    /// Rebuilds layer-2 state (the live continuum, or for range pools
    /// nothing — range dispatch consults liveness per call) if due, or
    /// unconditionally when `force`.
    ///
    /// If every server is currently ejected, the existing
    /// continuum is preserved rather than replaced with an empty one,
    /// so [`Self::dispatch`] can still report
    /// [`PoolError::ServiceUnavailable`] instead of panicking on an
    /// empty continuum.
    pub fn rebuild(&mut self, now: u64, force: bool) {
        if matches!(self.distributor, Distributor::Range(_)) {
            self.recompute_next_rebuild(now);
            return;
        }
        if !force && (self.next_rebuild == 0 || now < self.next_rebuild) {
            return;
        }

        let live: Vec<usize> = self
            .servers
            .iter()
            .filter(|s| !s.is_ejected(now))
            .map(|s| s.index)
            .collect();

        if !live.is_empty() {
            self.distributor = match self.dist_type {
                DistType::Ketama => {
                    let ketama_servers: Vec<ketama::KetamaServer> = live
                        .iter()
                        .map(|&index| ketama::KetamaServer {
                            index,
                            name: self.servers[index].ketama_name.clone(),
                            weight: self.servers[index].weight,
                        })
                        .collect();
                    Distributor::Ketama(ketama::build(&ketama_servers))
                }
                DistType::Modula => Distributor::Modula(Continuum::flat(live)),
                DistType::Random => Distributor::Random(Continuum::flat(live)),
                DistType::Range => unreachable!("handled above"),
            };
        }

        self.recompute_next_rebuild(now);
    }

    fn recompute_next_rebuild(&mut self, now: u64) {
        let _ = now;
        self.next_rebuild = self
            .servers
            .iter()
            .map(|s| s.next_retry)
            .filter(|&t| t > 0)
            .min()
            .unwrap_or(0);
    }

    /// Dispatches `hash` to a live server index, rebuilding first if a
    /// rebuild is due. `write` selects the read or write tag lane for a
    /// range-distributed pool; ketama/modula/random ignore it.
    pub fn dispatch(
        &mut self,
        hash: u32,
        write: bool,
        now: u64,
        rng: &mut impl rand::Rng,
    ) -> Result<usize, PoolError> {
        if self.auto_eject_hosts {
            self.rebuild(now, false);
        }
        let servers = &self.servers;
        let idx = self
            .distributor
            .dispatch(hash, write, rng, |i| !servers[i].is_ejected(now))
            .map_err(|_| PoolError::ServiceUnavailable)?;
        if self.servers[idx].is_ejected(now) {
            return Err(PoolError::ServiceUnavailable);
        }
        Ok(idx)
    }

    /// Records a server failure and ejects it once the failure limit is
    /// reached.
    pub fn on_server_failure(&mut self, index: usize, now: u64) {
        let ejected = {
            let server = &mut self.servers[index];
            self.auto_eject_hosts
                && server.record_failure(now, self.server_failure_limit, self.server_retry_timeout_usec)
        };
        if ejected {
            self.next_rebuild = self.next_rebuild.min(self.servers[index].next_retry);
            if self.next_rebuild == 0 {
                self.next_rebuild = self.servers[index].next_retry;
            }
            #[cfg(feature = "tracing")]
            tracing::warn!(pool = %self.name, server = self.servers[index].name, "server ejected after failure limit");
            self.rebuild(now, true);
        }
    }

    /// Records a server success (connect or response), clearing any
    /// ejection.
    pub fn on_server_success(&mut self, index: usize) {
        let was_ejected = self.servers[index].next_retry > 0;
        self.servers[index].record_success();
        if was_ejected {
            #[cfg(feature = "tracing")]
            tracing::info!(pool = %self.name, server = self.servers[index].name, "server recovered");
        }
    }

    /// Applies a parsed `STAT` probe response's key/value pairs to a
    /// server's cached stats, consulted by [`crate::registry::Registry::route`]
    /// to gate peer warm-up on `cold`.
    pub fn apply_stat_probe(&mut self, index: usize, pairs: &[(Vec<u8>, Vec<u8>)]) {
        self.servers[index].stats = crate::server::ServerStats::from_pairs(pairs);
    }

    /// Servers due for an active probe at `now`, advancing their
    /// `next_probe` schedule by `server_retry_timeout`.
    pub fn due_for_probe(&mut self, now: u64) -> Vec<usize> {
        if !self.auto_probe_hosts {
            return Vec::new();
        }
        let mut due = Vec::new();
        for server in &mut self.servers {
            if server.next_probe <= now {
                server.next_probe = now + self.server_retry_timeout_usec;
                due.push(server.index);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn yaml_pool(dist_type: &str, servers: &[&str]) -> PoolConfig {
        let joined = servers
            .iter()
            .map(|s| format!("    - {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        let yaml = format!(
            "listen: 127.0.0.1:11211\ndist_type: {dist_type}\nhash: fnv1a_32\nservers:\n{joined}\n"
        );
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn addrs(n: usize) -> Vec<SocketAddr> {
        (0..n)
            .map(|i| SocketAddr::from(([127, 0, 0, 1], 11000 + i as u16)))
            .collect()
    }

    #[test]
    fn ejects_after_failure_limit_and_recovers() {
        let cfg_yaml = "listen: 127.0.0.1:11211\ndist_type: modula\nhash: fnv1a_32\nauto_eject_hosts: true\nserver_failure_limit: 2\nserver_retry_timeout_ms: 100\nservers:\n  - a:11211:1\n  - b:11211:1\n";
        let cfg: PoolConfig = serde_yaml::from_str(cfg_yaml).unwrap();
        let mut pool = Pool::build("p".into(), &cfg, &addrs(2)).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        pool.on_server_failure(0, 0);
        pool.on_server_failure(0, 0);
        assert!(pool.servers[0].is_ejected(0));

        for _ in 0..20 {
            let idx = pool.dispatch(1, false, 0, &mut rng).unwrap();
            assert_eq!(idx, 1);
        }

        pool.on_server_success(0);
        assert!(!pool.servers[0].is_ejected(0));
    }

    #[test]
    fn dispatch_reports_unavailable_when_all_ejected() {
        let cfg = yaml_pool("modula", &["a:11211:1"]);
        let mut pool = Pool::build("p".into(), &cfg, &addrs(1)).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        pool.on_server_failure(0, 0);
        pool.on_server_failure(0, 0);
        assert_eq!(pool.dispatch(1, false, 0, &mut rng), Err(PoolError::ServiceUnavailable));
    }

    #[test]
    fn range_pool_skips_continuum_rebuild() {
        let cfg_yaml = "listen: 127.0.0.1:11211\ndist_type: range\nhash: fnv1a_32\nservers:\n  - a:11211:1 0-65536\n";
        let cfg: PoolConfig = serde_yaml::from_str(cfg_yaml).unwrap();
        let mut pool = Pool::build("p".into(), &cfg, &addrs(1)).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(pool.dispatch(10, false, 0, &mut rng).unwrap(), 0);
    }
}
