//! Recursive-descent parser for the server spec grammar:
//! `name:port:weight[ rstart-rend][ tag][ r|w|rw|none]`.
//!
//! The upstream implementation this grammar is carried over from
//! generates the equivalent parser with Ragel; the grammar is under 30
//! states, small enough that a handwritten parser is the idiomatic Rust
//! substitute rather than bringing in a parser-generator build step.

use crate::error::ConfigError;

/// Read/write capability a server advertises within its range partition.
/// Defaults to both, per the grammar's optional trailing flags token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerFlags {
    /// Server may serve reads.
    pub readable: bool,
    /// Server may serve writes.
    pub writable: bool,
}

impl Default for ServerFlags {
    fn default() -> Self {
        Self { readable: true, writable: true }
    }
}

/// One parsed `servers[]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Hostname, IP literal, or (rarely) unix socket path.
    pub name: String,
    /// TCP port.
    pub port: u16,
    /// Relative weight used by ketama's point-count formula.
    pub weight: u32,
    /// `[range_start, range_end)` window for the range distributor.
    pub range: Option<(u32, u32)>,
    /// Locality/role tag used by range-dispatch failover.
    pub tag: Option<String>,
    /// Read/write capability flags.
    pub flags: ServerFlags,
}

impl ServerSpec {
    /// Parses one `servers[]` entry.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let fail = |position: usize, reason: &'static str| ConfigError::ServerSpec {
            spec: spec.to_string(),
            position,
            reason,
        };

        let mut tokens = spec.split_whitespace();
        let head = tokens.next().ok_or_else(|| fail(0, "empty server spec"))?;

        let mut parts = head.splitn(3, ':');
        let name = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| fail(0, "missing server name"))?
            .to_string();
        let port_str = parts
            .next()
            .ok_or_else(|| fail(name.len(), "missing port"))?;
        let weight_str = parts
            .next()
            .ok_or_else(|| fail(name.len(), "missing weight"))?;

        let port: u16 = port_str
            .parse()
            .map_err(|_| fail(name.len() + 1, "port is not a valid u16"))?;
        let weight: u32 = weight_str
            .parse()
            .map_err(|_| fail(name.len() + 2 + port_str.len(), "weight is not a valid u32"))?;

        let mut range = None;
        let mut tag = None;
        let mut flags = None;

        for token in tokens {
            if let Some((start, end)) = token.split_once('-') {
                if let (Ok(s), Ok(e)) = (start.parse::<u32>(), end.parse::<u32>()) {
                    range = Some((s, e));
                    continue;
                }
            }
            match token {
                "r" => flags = Some(ServerFlags { readable: true, writable: false }),
                "w" => flags = Some(ServerFlags { readable: false, writable: true }),
                "rw" => flags = Some(ServerFlags { readable: true, writable: true }),
                "none" => flags = Some(ServerFlags { readable: false, writable: false }),
                _ => tag = Some(token.to_string()),
            }
        }

        Ok(Self {
            name,
            port,
            weight,
            range,
            tag,
            flags: flags.unwrap_or_default(),
        })
    }

    /// The name ketama hashes into ring points, preserving the legacy
    /// naming quirk bit-for-bit: when the server has no explicit display
    /// name distinct from its host and listens on the memcached default
    /// port, the ring name is the host alone.
    #[must_use]
    pub fn ketama_name(&self) -> String {
        if self.port == 11211 {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.port)
        }
    }

    /// This spec's placement within a range-distributor topology, at
    /// `index` in the pool's server list.
    #[must_use]
    pub fn to_range_server(&self, index: usize) -> distributor::RangeServer {
        let (range_start, range_end) = self.range.unwrap_or((0, distributor::DIST_RANGE_MAX));
        distributor::RangeServer {
            index,
            range_start,
            range_end,
            tag: self.tag.clone(),
            readable: self.flags.readable,
            writable: self.flags.writable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_spec() {
        let s = ServerSpec::parse("10.0.0.1:11211:1").unwrap();
        assert_eq!(s.name, "10.0.0.1");
        assert_eq!(s.port, 11211);
        assert_eq!(s.weight, 1);
        assert_eq!(s.range, None);
        assert_eq!(s.tag, None);
        assert_eq!(s.flags, ServerFlags::default());
    }

    #[test]
    fn parses_range_tag_and_flags() {
        let s = ServerSpec::parse("cache-a:6379:2 0-32768 dc1 r").unwrap();
        assert_eq!(s.range, Some((0, 32768)));
        assert_eq!(s.tag.as_deref(), Some("dc1"));
        assert_eq!(s.flags, ServerFlags { readable: true, writable: false });
    }

    #[test]
    fn parses_flags_before_tag() {
        let s = ServerSpec::parse("host:1:1 rw dc2").unwrap();
        assert_eq!(s.tag.as_deref(), Some("dc2"));
        assert_eq!(s.flags, ServerFlags { readable: true, writable: true });
    }

    #[test]
    fn ketama_name_drops_port_for_default_memcached_port() {
        let s = ServerSpec::parse("a:11211:1").unwrap();
        assert_eq!(s.ketama_name(), "a");
    }

    #[test]
    fn ketama_name_keeps_port_otherwise() {
        let s = ServerSpec::parse("a:6379:1").unwrap();
        assert_eq!(s.ketama_name(), "a:6379");
    }

    #[test]
    fn rejects_missing_weight() {
        assert!(ServerSpec::parse("a:1").is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(ServerSpec::parse("a:x:1").is_err());
    }
}
