//! The range distributor: a two-layer topology of fixed partitions, each
//! owned by one or more replica servers tagged by role (read/write) and by
//! an arbitrary locality tag.
//!
//! Layer one is static: every configured server names the `[range_start,
//! range_end)` partition it serves, validated once at pool-build time so
//! the partitions tile `[0, DIST_RANGE_MAX)` with no gap and no overlap
//! (replicas aside). Layer two is two parallel structures per partition —
//! readable and writable — each an ordered list of tag lanes; a lane holds
//! every replica sharing one tag (or no tag) and the requested read/write
//! capability. Dispatch walks a request's read-or-write lane list in
//! configured order and returns the first lane with a live member.

use crate::error::{DistributorError, RangeBuildError};

/// The size of the range keyspace partitions tile, matching the historical
/// `DIST_RANGE_MAX` constant carried over from the range-sharding scheme
/// this distributor reimplements.
pub const DIST_RANGE_MAX: u32 = 65536;

/// Caps how many failover hops a single partition lookup will walk before
/// giving up, bounding worst-case dispatch latency under cascading outages.
pub const MAX_FAILOVER_TAGS: usize = 8;

/// One server's static placement within the range topology.
#[derive(Debug, Clone)]
pub struct RangeServer {
    /// Index into the owning pool's `servers[]`.
    pub index: usize,
    /// Start of the half-open partition this server replicates, inclusive.
    pub range_start: u32,
    /// End of the half-open partition this server replicates, exclusive.
    pub range_end: u32,
    /// Locality/role tag used to group replicas into failover lanes;
    /// replicas with no tag share the untagged lane.
    pub tag: Option<String>,
    /// Whether this replica serves reads.
    pub readable: bool,
    /// Whether this replica serves writes.
    pub writable: bool,
}

#[derive(Debug, Clone)]
struct TagLane {
    members: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Partition {
    range_start: u32,
    range_end: u32,
    /// Read-capable replicas, grouped into tag lanes in first-appearance
    /// (i.e. configured) order.
    read_lanes: Vec<TagLane>,
    /// Write-capable replicas, grouped the same way.
    write_lanes: Vec<TagLane>,
}

fn tag_lanes(replicas: &[RangeServer], want: impl Fn(&RangeServer) -> bool) -> Vec<TagLane> {
    let mut tags: Vec<Option<String>> = Vec::new();
    let mut lanes: Vec<TagLane> = Vec::new();
    for replica in replicas.iter().filter(|r| want(r)) {
        let lane_idx = match tags.iter().position(|t| *t == replica.tag) {
            Some(idx) => idx,
            None => {
                tags.push(replica.tag.clone());
                lanes.push(TagLane { members: Vec::new() });
                lanes.len() - 1
            }
        };
        lanes[lane_idx].members.push(replica.index);
    }
    lanes
}

/// A validated, static range topology plus the currently-live subset used
/// for dispatch.
#[derive(Debug, Clone)]
pub struct RangeTopology {
    partitions: Vec<Partition>,
    /// When `true`, the partition index is XOR-folded against a hash of the
    /// pool name before lookup, spreading hot partitions across otherwise
    /// identical deployments. Off by default: the upstream scheme this
    /// mirrors left it disabled, and enabling it changes which server owns
    /// a given key for every existing deployment.
    xor_fold_by_pool_name: bool,
    pool_name_hash: u32,
}

impl RangeTopology {
    /// Validates and builds a range topology from its static server list.
    ///
    /// # Errors
    ///
    /// Returns [`RangeBuildError`] if `servers` is empty, does not start at
    /// `0`, does not reach [`DIST_RANGE_MAX`], leaves a gap or overlap
    /// between non-replica partitions, or if replicas of the same
    /// partition disagree on `range_end`.
    pub fn build(
        servers: Vec<RangeServer>,
        pool_name: &str,
        xor_fold_by_pool_name: bool,
    ) -> Result<Self, RangeBuildError> {
        if servers.is_empty() {
            return Err(RangeBuildError::NoServers);
        }

        // Stable: replicas of the same partition keep their configured
        // relative order, which is what gives tag lanes a deterministic
        // failover order without a separate ordinal field.
        let mut servers = servers;
        servers.sort_by_key(|s| s.range_start);

        let mut groups: Vec<(u32, u32, Vec<RangeServer>)> = Vec::new();
        for server in servers {
            match groups.last_mut() {
                Some((range_start, range_end, replicas)) if *range_start == server.range_start => {
                    if *range_end != server.range_end {
                        return Err(RangeBuildError::ReplicaRangeMismatch {
                            range_start: server.range_start,
                        });
                    }
                    replicas.push(server);
                }
                _ => groups.push((server.range_start, server.range_end, vec![server])),
            }
        }

        let partitions: Vec<Partition> = groups
            .into_iter()
            .map(|(range_start, range_end, replicas)| Partition {
                range_start,
                range_end,
                read_lanes: tag_lanes(&replicas, |r| r.readable),
                write_lanes: tag_lanes(&replicas, |r| r.writable),
            })
            .collect();

        let first = &partitions[0];
        if first.range_start != 0 {
            return Err(RangeBuildError::DoesNotStartAtZero(first.range_start));
        }

        for pair in partitions.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.range_end != next.range_start {
                return Err(RangeBuildError::Discontiguous {
                    prev_start: prev.range_start,
                    prev_end: prev.range_end,
                    next_start: next.range_start,
                    next_end: next.range_end,
                });
            }
        }

        let last = &partitions[partitions.len() - 1];
        if last.range_end != DIST_RANGE_MAX {
            return Err(RangeBuildError::DoesNotReachMax {
                expected: DIST_RANGE_MAX,
                actual: last.range_end,
            });
        }

        Ok(Self {
            partitions,
            xor_fold_by_pool_name,
            pool_name_hash: hashkit::fnv1a_32(pool_name.as_bytes()),
        })
    }

    fn partition_for(&self, hash: u32) -> &Partition {
        let mut slot = hash % DIST_RANGE_MAX;
        if self.xor_fold_by_pool_name {
            slot ^= self.pool_name_hash % DIST_RANGE_MAX;
            slot %= DIST_RANGE_MAX;
        }
        let idx = self
            .partitions
            .partition_point(|p| p.range_end <= slot)
            .min(self.partitions.len() - 1);
        &self.partitions[idx]
    }

    /// Resolves `hash` to a live replica of its owning partition capable of
    /// serving the request's role (`write`), walking tag lanes in
    /// configured order.
    ///
    /// For the chosen lane, `is_live` is consulted for every member; a
    /// lane with zero live members is skipped in favor of the next lane
    /// (up to [`MAX_FAILOVER_TAGS`] lanes). Within a live lane, a single
    /// live member is returned deterministically; two or more are broken
    /// by a uniform random pick via `rng`, per the "pick uniformly at
    /// random" failover policy.
    pub fn dispatch(
        &self,
        hash: u32,
        write: bool,
        mut is_live: impl FnMut(usize) -> bool,
        rng: &mut impl rand::Rng,
    ) -> Result<usize, DistributorError> {
        let partition = self.partition_for(hash);
        let lanes = if write { &partition.write_lanes } else { &partition.read_lanes };
        for lane in lanes.iter().take(MAX_FAILOVER_TAGS) {
            let live: Vec<usize> = lane.members.iter().copied().filter(|&i| is_live(i)).collect();
            match live.len() {
                0 => continue,
                1 => return Ok(live[0]),
                n => return Ok(live[rng.random_range(0..n)]),
            }
        }
        Err(DistributorError::ServiceUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rw(index: usize, range_start: u32, range_end: u32) -> RangeServer {
        RangeServer { index, range_start, range_end, tag: None, readable: true, writable: true }
    }

    fn two_partitions_one_replica_each() -> Vec<RangeServer> {
        vec![rw(0, 0, 32768), rw(1, 32768, DIST_RANGE_MAX)]
    }

    #[test]
    fn dispatch_routes_to_the_owning_partition() {
        let topo = RangeTopology::build(two_partitions_one_replica_each(), "pool", false).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(topo.dispatch(0, false, |_| true, &mut rng).unwrap(), 0);
        assert_eq!(topo.dispatch(32767, false, |_| true, &mut rng).unwrap(), 0);
        assert_eq!(topo.dispatch(32768, false, |_| true, &mut rng).unwrap(), 1);
        assert_eq!(topo.dispatch(DIST_RANGE_MAX - 1, false, |_| true, &mut rng).unwrap(), 1);
    }

    #[test]
    fn dispatch_fails_over_to_next_tag() {
        let servers = vec![
            RangeServer { index: 0, range_start: 0, range_end: DIST_RANGE_MAX, tag: Some("r1".into()), readable: true, writable: true },
            RangeServer { index: 1, range_start: 0, range_end: DIST_RANGE_MAX, tag: Some("r2".into()), readable: true, writable: true },
        ];
        let topo = RangeTopology::build(servers, "pool", false).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(topo.dispatch(10, false, |i| i == 1, &mut rng).unwrap(), 1);
    }

    #[test]
    fn dispatch_reports_unavailable_when_all_replicas_are_down() {
        let topo = RangeTopology::build(two_partitions_one_replica_each(), "pool", false).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            topo.dispatch(10, false, |_| false, &mut rng),
            Err(DistributorError::ServiceUnavailable)
        );
    }

    #[test]
    fn dispatch_splits_reads_and_writes_by_tag() {
        // One partition, a read-only replica tagged r1 and a write-only
        // replica tagged w1, as in the readable/writable replica scenario.
        let servers = vec![
            RangeServer { index: 0, range_start: 0, range_end: DIST_RANGE_MAX, tag: Some("r1".into()), readable: true, writable: false },
            RangeServer { index: 1, range_start: 0, range_end: DIST_RANGE_MAX, tag: Some("w1".into()), readable: false, writable: true },
        ];
        let topo = RangeTopology::build(servers, "pool", false).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(topo.dispatch(0x4000, false, |_| true, &mut rng).unwrap(), 0);
        assert_eq!(topo.dispatch(0x4000, true, |_| true, &mut rng).unwrap(), 1);
    }

    #[test]
    fn dispatch_picks_randomly_within_a_live_tag_lane() {
        let servers = vec![
            RangeServer { index: 0, range_start: 0, range_end: DIST_RANGE_MAX, tag: Some("r1".into()), readable: true, writable: true },
            RangeServer { index: 1, range_start: 0, range_end: DIST_RANGE_MAX, tag: Some("r1".into()), readable: true, writable: true },
        ];
        let topo = RangeTopology::build(servers, "pool", false).unwrap();
        let mut seen = std::collections::HashSet::new();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            seen.insert(topo.dispatch(10, false, |_| true, &mut rng).unwrap());
        }
        assert_eq!(seen, std::collections::HashSet::from([0, 1]));
    }

    #[test]
    fn build_rejects_a_gap() {
        let servers = vec![rw(0, 0, 100), rw(1, 200, DIST_RANGE_MAX)];
        assert!(matches!(
            RangeTopology::build(servers, "pool", false),
            Err(RangeBuildError::Discontiguous { .. })
        ));
    }

    #[test]
    fn build_rejects_non_zero_start() {
        let servers = vec![rw(0, 1, DIST_RANGE_MAX)];
        assert!(matches!(
            RangeTopology::build(servers, "pool", false),
            Err(RangeBuildError::DoesNotStartAtZero(1))
        ));
    }

    #[test]
    fn build_rejects_short_of_max() {
        let servers = vec![rw(0, 0, 100)];
        assert!(matches!(
            RangeTopology::build(servers, "pool", false),
            Err(RangeBuildError::DoesNotReachMax { .. })
        ));
    }

    #[test]
    fn build_rejects_replica_range_mismatch() {
        let servers = vec![rw(0, 0, 100), rw(1, 0, 200)];
        assert!(matches!(
            RangeTopology::build(servers, "pool", false),
            Err(RangeBuildError::ReplicaRangeMismatch { range_start: 0 })
        ));
    }

    #[test]
    fn build_rejects_empty_server_list() {
        assert!(matches!(
            RangeTopology::build(vec![], "pool", false),
            Err(RangeBuildError::NoServers)
        ));
    }
}
