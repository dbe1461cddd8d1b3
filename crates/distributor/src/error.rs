/// Errors a distributor can report while building or dispatching.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum DistributorError {
    /// No live server could be found for this key under the current
    /// topology (every candidate server, and every failover tag, is
    /// ejected).
    #[error("no server available")]
    ServiceUnavailable,
    /// The continuum is empty; `dispatch` was called before a successful
    /// build, or every server was removed from the configuration.
    #[error("continuum has no entries")]
    EmptyContinuum,
}

/// Errors reported while validating a range-distributor topology.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RangeBuildError {
    /// The server list was empty.
    #[error("range distributor requires at least one server")]
    NoServers,
    /// The first partition does not start at zero.
    #[error("range distributor must start at 0, got {0}")]
    DoesNotStartAtZero(u32),
    /// The last partition does not reach `DIST_RANGE_MAX`.
    #[error("range distributor must end at {expected}, got {actual}")]
    DoesNotReachMax {
        /// `DIST_RANGE_MAX`.
        expected: u32,
        /// The observed final `range_end`.
        actual: u32,
    },
    /// Two partitions overlap, or leave a gap, without forming replicas of
    /// the same partition (same `range_start` *and* `range_end`).
    #[error("range gap or overlap between [{prev_start}, {prev_end}) and [{next_start}, {next_end})")]
    Discontiguous {
        /// Start of the earlier partition.
        prev_start: u32,
        /// End of the earlier partition.
        prev_end: u32,
        /// Start of the following partition.
        next_start: u32,
        /// End of the following partition.
        next_end: u32,
    },
    /// Two servers share a `range_start` but disagree on `range_end`, so
    /// they cannot be grouped as replicas of one partition.
    #[error("servers sharing range_start {range_start} disagree on range_end")]
    ReplicaRangeMismatch {
        /// The shared `range_start`.
        range_start: u32,
    },
}
