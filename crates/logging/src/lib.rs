#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `logging` is the proxy's thin verbosity layer: it turns repeated
//! `-v` flags on `ncproxyd`'s command line into a [`tracing`]
//! `EnvFilter` directive, and (behind the `tracing` feature) installs a
//! global subscriber that writes to stderr. Nothing in this crate is
//! proxy-domain-specific — it is the same shape of crate the rest of
//! the workspace leans on for structured, filterable diagnostics rather
//! than ad-hoc `eprintln!`.
//!
//! # Design
//!
//! [`Verbosity`] is a single `u8` rather than a per-subsystem flag
//! taxonomy: the proxy's log volume concern is "how chatty," not "which
//! subsystem," so one knob mapped onto [`tracing`]'s level filter is
//! enough. [`Verbosity::env_filter_directive`] is deliberately a plain
//! string rather than a parsed [`tracing_subscriber::filter::EnvFilter`]
//! so callers that only want the directive (e.g. to combine with
//! `RUST_LOG`) don't need the `tracing` feature enabled.

use std::fmt;

/// How chatty the proxy's logging should be, driven by counting `-v`
/// flags on the command line.
///
/// | count | level   |
/// |-------|---------|
/// | 0     | `warn`  |
/// | 1     | `info`  |
/// | 2     | `debug` |
/// | 3+    | `trace` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Verbosity(u8);

impl Verbosity {
    /// Builds a verbosity level directly from a `-v` repeat count.
    #[must_use]
    pub fn from_flag_count(count: u8) -> Self {
        Self(count)
    }

    /// The raw repeat count this level was built from.
    #[must_use]
    pub fn level(self) -> u8 {
        self.0
    }

    /// The `tracing`/`RUST_LOG`-style directive this level maps onto,
    /// applied to every target (no per-crate overrides) since the proxy
    /// has no subsystem-specific verbosity concept, only "how chatty."
    #[must_use]
    pub fn env_filter_directive(self) -> &'static str {
        match self.0 {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.env_filter_directive())
    }
}

/// Installs the global `tracing` subscriber at the given [`Verbosity`],
/// honouring `RUST_LOG` as an override when set (so an operator can
/// still scope an individual deployment's logging past what `-v`
/// expresses) and falling back to `verbosity`'s directive otherwise.
///
/// Returns an error if a subscriber was already installed (e.g. called
/// twice in the same process, or in a test harness that installs its
/// own).
#[cfg(feature = "tracing")]
pub fn install(verbosity: Verbosity) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.env_filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_flags_maps_to_warn() {
        assert_eq!(Verbosity::from_flag_count(0).env_filter_directive(), "warn");
    }

    #[test]
    fn one_flag_maps_to_info() {
        assert_eq!(Verbosity::from_flag_count(1).env_filter_directive(), "info");
    }

    #[test]
    fn two_flags_maps_to_debug() {
        assert_eq!(Verbosity::from_flag_count(2).env_filter_directive(), "debug");
    }

    #[test]
    fn three_or_more_flags_maps_to_trace() {
        assert_eq!(Verbosity::from_flag_count(3).env_filter_directive(), "trace");
        assert_eq!(Verbosity::from_flag_count(10).env_filter_directive(), "trace");
    }

    #[test]
    fn ordering_follows_flag_count() {
        assert!(Verbosity::from_flag_count(1) < Verbosity::from_flag_count(2));
    }

    #[test]
    fn default_is_zero_flags() {
        assert_eq!(Verbosity::default(), Verbosity::from_flag_count(0));
    }

    #[test]
    fn display_matches_directive() {
        assert_eq!(Verbosity::from_flag_count(2).to_string(), "debug");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn round_trips_through_json() {
        let level = Verbosity::from_flag_count(2);
        let json = serde_json::to_string(&level).unwrap();
        let back: Verbosity = serde_json::from_str(&json).unwrap();
        assert_eq!(level, back);
    }
}
