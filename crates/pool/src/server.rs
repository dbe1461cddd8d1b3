//! A single backend server's identity and failure-tracking state.

/// Protocol-specific probe statistics, populated by parsing a `stats`
/// (memcached) or equivalent probe response. `cold` drives peer warm-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerStats {
    /// Seconds the backend process has been running.
    pub uptime: u64,
    /// Whether the backend considers itself freshly started (empty
    /// cache) and therefore a warm-up candidate.
    pub cold: bool,
    /// Cumulative `get` command count, as last probed.
    pub cmd_get: u64,
    /// Cumulative `get` hit count, as last probed.
    pub get_hits: u64,
}

impl ServerStats {
    /// Builds stats from a memcached `STAT` stream's key/value pairs.
    /// Unknown keys are ignored; keys the stream omitted keep their
    /// default (zero, not cold).
    #[must_use]
    pub fn from_pairs(pairs: &[(Vec<u8>, Vec<u8>)]) -> Self {
        let mut stats = Self::default();
        for (key, val) in pairs {
            let text = std::str::from_utf8(val).ok();
            match key.as_slice() {
                b"uptime" => stats.uptime = text.and_then(|s| s.parse().ok()).unwrap_or(0),
                b"cold" => stats.cold = text.is_some_and(|s| s.trim() != "0"),
                b"cmd_get" => stats.cmd_get = text.and_then(|s| s.parse().ok()).unwrap_or(0),
                b"get_hits" => stats.get_hits = text.and_then(|s| s.parse().ok()).unwrap_or(0),
                _ => {}
            }
        }
        stats
    }
}

/// A configured backend endpoint plus its runtime failure/probe state.
#[derive(Debug, Clone)]
pub struct Server {
    /// Index into the owning pool's server list; stable across rebuilds.
    pub index: usize,
    /// Display name used verbatim in logs and diagnostics.
    pub name: String,
    /// Ring name for ketama, reflecting the legacy naming quirk.
    pub ketama_name: String,
    /// Resolved socket address.
    pub addr: std::net::SocketAddr,
    /// Relative weight.
    pub weight: u32,
    /// Consecutive failures since the last success.
    pub failure_count: u32,
    /// Wall-clock microseconds before which this server is ejected;
    /// `0` means not ejected.
    pub next_retry: u64,
    /// Wall-clock microseconds of the next scheduled active probe.
    pub next_probe: u64,
    /// Last-parsed probe statistics.
    pub stats: ServerStats,
}

impl Server {
    /// Whether `now` (wall-clock microseconds) falls inside this
    /// server's ejection window.
    #[must_use]
    pub fn is_ejected(&self, now: u64) -> bool {
        self.next_retry > now
    }

    /// Records a failed operation, ejecting the server once
    /// `failure_count` reaches `failure_limit`. Returns `true` the
    /// instant the server transitions into ejection.
    pub fn record_failure(&mut self, now: u64, failure_limit: u32, retry_timeout_usec: u64) -> bool {
        self.failure_count = self.failure_count.saturating_add(1);
        if self.failure_count >= failure_limit && self.next_retry == 0 {
            self.next_retry = now + retry_timeout_usec;
            return true;
        }
        false
    }

    /// Records a successful operation: clears the failure count and any
    /// ejection window.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.next_retry = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_from_pairs_extracts_known_keys() {
        let pairs = vec![
            (b"uptime".to_vec(), b"100".to_vec()),
            (b"cold".to_vec(), b"1".to_vec()),
            (b"cmd_get".to_vec(), b"42".to_vec()),
            (b"get_hits".to_vec(), b"7".to_vec()),
            (b"pid".to_vec(), b"123".to_vec()),
        ];
        let stats = ServerStats::from_pairs(&pairs);
        assert_eq!(stats.uptime, 100);
        assert!(stats.cold);
        assert_eq!(stats.cmd_get, 42);
        assert_eq!(stats.get_hits, 7);
    }

    #[test]
    fn stats_from_pairs_cold_zero_is_not_cold() {
        let pairs = vec![(b"cold".to_vec(), b"0".to_vec())];
        assert!(!ServerStats::from_pairs(&pairs).cold);
    }
}
