//! Ketama consistent-hash continuum construction.
//!
//! Ring points are generated from successive MD5 hashes of `"<name>-<n>"`,
//! four 32-bit ring entries per digest, matching libketama and the memcached
//! clients built on it. `name` must already reflect the legacy naming quirk
//! (host-only when the port is the memcached default and no display name
//! was configured) so that two deployments of this proxy against the same
//! backends build byte-identical rings.

use crate::continuum::{Continuum, ContinuumEntry};

const POINTS_PER_SERVER: u32 = 160;

/// One live server as seen by the ketama ring builder.
#[derive(Debug, Clone)]
pub struct KetamaServer {
    /// Index into the owning pool's `servers[]`.
    pub index: usize,
    /// Ring-naming string, already adjusted for the legacy naming quirk.
    pub name: String,
    /// Configured weight (usually `1`).
    pub weight: u32,
}

/// Builds a ketama continuum over the given live servers.
///
/// Each server contributes `160 * weight / mean_weight` ring points,
/// generated in groups of four from MD5 hashes of `"<name>-<n>"` for
/// `n = 0, 1, 2, ...`. An empty `servers` slice yields an empty continuum;
/// callers preserve the previous continuum in that case per the pool
/// lifecycle's "continuum is always non-null" invariant.
#[must_use]
pub fn build(servers: &[KetamaServer]) -> Continuum {
    if servers.is_empty() {
        return Continuum::default();
    }

    let total_weight: u64 = servers.iter().map(|s| u64::from(s.weight.max(1))).sum();
    let mean_weight = total_weight / servers.len() as u64;
    let mean_weight = mean_weight.max(1);

    let mut entries = Vec::new();
    for server in servers {
        let weight = u64::from(server.weight.max(1));
        let points = (u64::from(POINTS_PER_SERVER) * weight / mean_weight).max(1);
        // Ring points come four-per-digest; round the per-server point
        // count down to the nearest multiple of four, but always emit at
        // least one digest's worth so every server gets a foothold.
        let digests = (points / 4).max(1);

        for n in 0..digests {
            let input = format!("{}-{}", server.name, n);
            let words = hashkit::md5_digest_words(input.as_bytes());
            for word in words {
                entries.push(ContinuumEntry {
                    index: server.index,
                    value: word,
                });
            }
        }
    }

    Continuum::from_entries(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_is_deterministic() {
        let servers = vec![
            KetamaServer { index: 0, name: "a".into(), weight: 1 },
            KetamaServer { index: 1, name: "b".into(), weight: 1 },
            KetamaServer { index: 2, name: "c".into(), weight: 1 },
        ];
        let c1 = build(&servers);
        let c2 = build(&servers);
        assert_eq!(c1.len(), c2.len());
        assert!(c1.len() >= 3 * 4);
    }

    #[test]
    fn minimal_remap_when_one_server_is_removed() {
        let three = vec![
            KetamaServer { index: 0, name: "a".into(), weight: 1 },
            KetamaServer { index: 1, name: "b".into(), weight: 1 },
            KetamaServer { index: 2, name: "c".into(), weight: 1 },
        ];
        let two = vec![
            KetamaServer { index: 1, name: "b".into(), weight: 1 },
            KetamaServer { index: 2, name: "c".into(), weight: 1 },
        ];

        let full = build(&three);
        let reduced = build(&two);

        // Sample a spread of hash values: any key that did not previously
        // land on the removed server ("a", index 0) must still resolve to
        // the same server after rebuild.
        for hash in (0u32..u32::MAX).step_by(104_729) {
            let before = full.dispatch_ketama(hash).unwrap();
            if before != 0 {
                let after = reduced.dispatch_ketama(hash).unwrap();
                assert_eq!(before, after, "key with hash {hash} remapped unnecessarily");
            }
        }
    }

    #[test]
    fn empty_server_list_yields_empty_continuum() {
        let c = build(&[]);
        assert!(c.is_empty());
    }
}
