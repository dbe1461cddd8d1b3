#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! Shared fixtures the rest of the workspace's test suites build on:
//! [`DuplexTransport`], an in-memory [`proxy_core::conn::Transport`]
//! pair standing in for a real `TcpStream` so `server`'s reactor tests
//! never open a socket; [`ScriptedTransport`], a canned
//! request/response script for tests that only care about one side of
//! the wire; and [`FakeClock`], a manually-advanced clock so
//! `next_retry`/`next_rebuild`/rate-limiter tests never depend on wall
//! time.
//!
//! Nothing here is specific to one crate's tests; `server` and the root
//! `ncproxyd` binary both depend on it as a dev-dependency.

mod clock;
mod duplex;
mod scripted;

pub use clock::FakeClock;
pub use duplex::{duplex_transport_pair, DuplexTransport};
pub use scripted::{scripted_transport, ScriptedTransport};
