#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `config` loads and validates the proxy's configuration document: a
//! YAML map of pool name to [`PoolConfig`], plus the `servers[]` spec
//! grammar each pool embeds. Validation resolves every cross-pool
//! reference (`gutter`, `peer`, `message_queue`, `downstreams[]`) against
//! sibling pools in the same document and rejects anything the runtime
//! could not act on, so that a configuration error is always a startup
//! failure rather than a silent runtime no-op.
//!
//! # Design
//!
//! The server spec grammar (`name:port:weight[ rstart-rend][ tag][
//! r|w|rw|none]`) is parsed by [`server_spec::ServerSpec::parse`], a
//! handwritten recursive-descent parser: the grammar is small and fixed,
//! so a generated parser table would add a build dependency for no
//! benefit. [`server_spec::ServerSpec::ketama_name`] implements the
//! legacy ketama-naming quirk once, so every caller that needs a ring
//! name gets it the same way.

mod error;
mod pool;
mod server_spec;

use std::collections::HashMap;
use std::path::Path;

pub use error::ConfigError;
pub use pool::{DistType, DownstreamConfig, PoolConfig, RATE_LIMIT_DISABLED};
pub use server_spec::{ServerFlags, ServerSpec};

/// A fully loaded, but not yet cross-validated, configuration document:
/// pool name → [`PoolConfig`].
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(transparent)]
pub struct Config {
    pools: HashMap<String, PoolConfig>,
}

impl Config {
    /// Loads and validates a configuration document from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses and validates a configuration document from an in-memory
    /// YAML string, as used by `ncproxyd --test-conf` and by tests.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Iterates over the document's pools by name.
    pub fn pools(&self) -> impl Iterator<Item = (&str, &PoolConfig)> {
        self.pools.iter().map(|(name, pool)| (name.as_str(), pool))
    }

    /// Looks up one pool by name.
    #[must_use]
    pub fn pool(&self, name: &str) -> Option<&PoolConfig> {
        self.pools.get(name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, pool) in &self.pools {
            if hashkit::HashAlgorithm::parse(&pool.hash).is_none() {
                return Err(ConfigError::UnknownHash {
                    pool: name.clone(),
                    hash: pool.hash.clone(),
                });
            }

            for (target, role) in [
                (&pool.gutter, "gutter"),
                (&pool.peer, "peer"),
                (&pool.message_queue, "message_queue"),
            ] {
                if let Some(target) = target {
                    if !self.pools.contains_key(target) {
                        return Err(ConfigError::UnknownPoolReference {
                            pool: name.clone(),
                            target: target.clone(),
                            role,
                        });
                    }
                }
            }

            if pool.virtual_pool != !pool.downstreams.is_empty() {
                return Err(ConfigError::VirtualPoolMisconfigured { pool: name.clone() });
            }

            for downstream in &pool.downstreams {
                if !self.pools.contains_key(&downstream.name) {
                    return Err(ConfigError::UnknownPoolReference {
                        pool: name.clone(),
                        target: downstream.name.clone(),
                        role: "downstreams",
                    });
                }
            }

            if pool.dist_type == DistType::Range && !pool.virtual_pool {
                let servers = pool.parsed_servers()?;
                let range_servers = servers
                    .iter()
                    .enumerate()
                    .map(|(index, spec)| spec.to_range_server(index))
                    .collect();
                distributor::RangeTopology::build(range_servers, name, false).map_err(|source| {
                    ConfigError::RangeTopology { pool: name.clone(), source }
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        "app:\n  \
         listen: 127.0.0.1:11211\n  \
         dist_type: ketama\n  \
         hash: fnv1a_32\n  \
         servers:\n    \
         - 10.0.0.1:11211:1\n    \
         - 10.0.0.2:11211:1\n"
    }

    #[test]
    fn loads_minimal_pool() {
        let config = Config::from_yaml_str(minimal_yaml()).unwrap();
        let pool = config.pool("app").unwrap();
        assert_eq!(pool.dist_type, DistType::Ketama);
        assert_eq!(pool.parsed_servers().unwrap().len(), 2);
    }

    #[test]
    fn rejects_unknown_hash() {
        let yaml = "app:\n  \
                     listen: 127.0.0.1:11211\n  \
                     dist_type: ketama\n  \
                     hash: sha256\n  \
                     servers: [a:11211:1]\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::UnknownHash { .. })
        ));
    }

    #[test]
    fn rejects_dangling_gutter_reference() {
        let yaml = "app:\n  \
                     listen: 127.0.0.1:11211\n  \
                     dist_type: ketama\n  \
                     gutter: missing\n  \
                     servers: [a:11211:1]\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::UnknownPoolReference { .. })
        ));
    }

    #[test]
    fn rejects_virtual_pool_without_downstreams() {
        let yaml = "app:\n  \
                     listen: 127.0.0.1:11211\n  \
                     dist_type: ketama\n  \
                     virtual_pool: true\n  \
                     servers: []\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::VirtualPoolMisconfigured { .. })
        ));
    }

    #[test]
    fn rejects_range_pool_with_gaps() {
        let yaml = "app:\n  \
                     listen: 127.0.0.1:11211\n  \
                     dist_type: range\n  \
                     servers:\n    \
                     - a:11211:1 0-100\n    \
                     - b:11211:1 200-65536\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(ConfigError::RangeTopology { .. })
        ));
    }
}
