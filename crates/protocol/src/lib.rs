#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `protocol` implements the two wire-protocol parsers the proxy speaks
//! to clients and backends: memcached ASCII and Redis RESP. Both are
//! incremental — they resume from a saved cursor on every call and may
//! span an arbitrary number of accumulated input buffers — and both
//! report the same five-way [`outcome::ParseOutcome`] so the connection
//! layer can treat them uniformly.
//!
//! # Design
//!
//! [`span::Span`] is the parsers' only way of referring to bytes: an
//! absolute `[start, end)` range into the caller's buffer, never a copy.
//! This lets downstream code compute a routing key, rewrite a `VALUE`
//! response into a warm-up `set ... noreply` request, or strip a
//! non-terminal `END\r\n` during fragment coalescing, all without
//! re-scanning or allocating.
//!
//! Multi-key requests (memcached `get`/`gets`, RESP `MGET`/`MSET`/`DEL`)
//! are fragmented by the request parsers themselves: [`outcome::ParseOutcome::Fragment`]
//! rewinds to the next key's first byte so the caller can emit one
//! sub-request per backend and reassemble the responses in order.
//!
//! # Invariants
//!
//! - Every parser resumes from exactly the `(pos, state)` pair it last
//!   reported; no parser buffers its own copy of pending input.
//! - `Repair` triggers only when a token is open *and* the buffer has
//!   hit its caller-supplied capacity — never merely because the
//!   buffer happens to be large.

pub mod error;
pub mod memcache;
pub mod outcome;
pub mod resp;
pub mod span;

pub use error::ParseError;
pub use outcome::ParseOutcome;
pub use span::Span;
