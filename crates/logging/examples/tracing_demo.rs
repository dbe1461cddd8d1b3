//! Demonstrates wiring [`logging::Verbosity`] into a `tracing`
//! subscriber and emitting a few events at each level it gates.
//!
//! Run with `cargo run -p logging --example tracing_demo --features tracing -- -vv`.

use logging::Verbosity;

fn main() {
    let flags = std::env::args().skip(1).filter(|a| a == "-v" || a.starts_with("-v")).count() as u8;
    let verbosity = Verbosity::from_flag_count(flags);
    logging::install(verbosity).expect("install tracing subscriber");

    tracing::warn!("server started at warn level (always visible)");
    tracing::info!(pool = "app", "accepted client connection");
    tracing::debug!(pool = "app", server = 2, "ejected server after failure limit");
    tracing::trace!(pool = "app", key = "foo", "routed request");
}
