#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `distributor` turns a routing key's hash into a server index, under
//! whichever of the four distribution strategies a pool is configured for:
//! `ketama` (consistent hashing, minimal remap on membership change),
//! `modula` (`hash % n`, full remap on every membership change), `random`
//! (ignores the hash entirely), and `range` (a static keyspace partition
//! with role- and tag-based failover, independent of any hash function).
//!
//! # Design
//!
//! [`Continuum`] is the shared substrate for ketama/modula/random: all
//! three resolve a hash against a sorted array of `{index, value}` pairs,
//! differing only in how `value` is populated ([`ketama::build`] for
//! ketama, [`Continuum::flat`] for modula/random) and how the array is
//! searched (binary search vs. modulo vs. uniform pick). [`range`] is
//! structurally unrelated: it never hashes, instead statically tiling a
//! fixed keyspace and walking a failover chain per partition.
//!
//! # Invariants
//!
//! - A distributor never panics on an empty server set; it reports
//!   [`DistributorError::EmptyContinuum`] or
//!   [`DistributorError::ServiceUnavailable`] instead.
//! - Rebuilding a ketama or modula/random continuum from an unchanged
//!   server set yields byte-identical dispatch decisions (no hidden
//!   randomness), so every proxy instance in a deployment agrees on
//!   routing without coordination.

mod continuum;
mod error;
pub mod ketama;
pub mod range;

pub use continuum::{Continuum, ContinuumEntry};
pub use error::{DistributorError, RangeBuildError};
pub use range::{RangeServer, RangeTopology, DIST_RANGE_MAX, MAX_FAILOVER_TAGS};

/// The four selectable distribution strategies, as named by the proxy's
/// configuration grammar (`ketama`, `modula`, `random`, `range`).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Distributor {
    /// Consistent hashing over an MD5-derived ring.
    Ketama(Continuum),
    /// `hash % n` over the live server list.
    Modula(Continuum),
    /// Uniform random pick, ignoring the hash.
    Random(Continuum),
    /// Static keyspace partitioning with tag-ordered failover.
    Range(RangeTopology),
}

impl Distributor {
    /// Resolves `hash` to a live server index.
    ///
    /// `range` distributors ignore `hash`'s caller-supplied value only in
    /// the sense that they derive their own partition key from it the same
    /// way modula does (`hash % DIST_RANGE_MAX`); `write` selects which of
    /// a range partition's read/write tag-lane lists is consulted (ignored
    /// by the other three strategies); `is_live` is consulted for range
    /// failover and ignored by the other three strategies, which assume
    /// the caller has already filtered `rng`/continuum to live servers.
    pub fn dispatch(
        &self,
        hash: u32,
        write: bool,
        rng: &mut impl rand::Rng,
        is_live: impl FnMut(usize) -> bool,
    ) -> Result<usize, DistributorError> {
        match self {
            Self::Ketama(continuum) => continuum.dispatch_ketama(hash),
            Self::Modula(continuum) => continuum.dispatch_modula(hash),
            Self::Random(continuum) => continuum.dispatch_random(rng),
            Self::Range(topology) => topology.dispatch(hash, write, is_live, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn ketama_variant_dispatches_via_continuum() {
        let servers = vec![
            ketama::KetamaServer { index: 0, name: "a".into(), weight: 1 },
            ketama::KetamaServer { index: 1, name: "b".into(), weight: 1 },
        ];
        let d = Distributor::Ketama(ketama::build(&servers));
        let mut rng = StdRng::seed_from_u64(0);
        let idx = d.dispatch(42, false, &mut rng, |_| true).unwrap();
        assert!(idx == 0 || idx == 1);
    }

    #[test]
    fn modula_variant_dispatches_via_continuum() {
        let d = Distributor::Modula(Continuum::flat([0, 1, 2]));
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(d.dispatch(3, false, &mut rng, |_| true).unwrap(), 0);
    }

    #[test]
    fn range_variant_dispatches_via_topology() {
        let topo = RangeTopology::build(
            vec![RangeServer { index: 7, range_start: 0, range_end: DIST_RANGE_MAX, tag: None, readable: true, writable: true }],
            "pool",
            false,
        )
        .unwrap();
        let d = Distributor::Range(topo);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(d.dispatch(123, false, &mut rng, |_| true).unwrap(), 7);
    }
}
