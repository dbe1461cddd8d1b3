#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `pool` owns the server-pool lifecycle: per-server failure tracking
//! and auto-eject, continuum/topology rebuild scheduling, active
//! probing, per-pool rate limiting, and the cross-pool routing rules
//! (gutter failover, peer warm-up, virtual/namespace pools) that sit on
//! top of the `distributor` crate's plain hash-to-index dispatch.
//!
//! # Design
//!
//! [`Pool`] wraps one [`distributor::Distributor`] with the live-set
//! bookkeeping a distributor alone doesn't do: which servers are
//! currently ejected, when the continuum is next due for a rebuild, and
//! the rate limiter's token bucket. [`Registry`] holds every pool in a
//! deployment and implements the policies that require seeing more than
//! one pool at a time — gutter failover retries against a named sibling
//! pool, peer warm-up reroutes a cold primary's read to a peer pool, and
//! virtual pools resolve a hash-tagged namespace to a concrete
//! downstream pool before routing proceeds there.
//!
//! # Invariants
//!
//! - A pool's continuum is never empty after a successful [`Pool::build`];
//!   if every server is ejected, the previous (stale) continuum is kept
//!   so [`Pool::dispatch`] can distinguish "no live server" from "never
//!   built," reporting [`PoolError::ServiceUnavailable`] either way.
//! - Range pools never rebuild: [`distributor::RangeTopology::dispatch`]
//!   takes a liveness closure evaluated per call, so ejection state is
//!   always current without a separate rebuild step.

mod error;
mod pool;
mod rate_limit;
mod registry;
mod server;

pub use error::PoolError;
pub use pool::Pool;
pub use rate_limit::RateLimiter;
pub use registry::{Registry, RouteOutcome, WarmupPlan};
pub use server::{Server, ServerStats};
