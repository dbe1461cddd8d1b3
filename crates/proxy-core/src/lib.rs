#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `proxy-core` is the reactor-agnostic heart of the proxy: it owns the
//! connection and message arenas, the request/response parsers'
//! resumption state, fragment coalescing, the timeout wheel, and the
//! [`engine::Engine`] that ties routing (via [`pool::Registry`]) to all
//! of the above. None of it touches a real socket or clock; `server`
//! drives an [`engine::Engine`] from `tokio` readiness events and a
//! wall clock, and `test-support` drives the same engine from an
//! in-memory transport and a [`FakeClock`]-style manual clock for tests.
//!
//! # Design
//!
//! [`arena::Arena`]/[`arena::Handle`] replace the source's process-wide
//! `msg`/`conn` free-lists and the raw pointers that cross-link a
//! fragment's siblings, a response to its request, and a warm-up read to
//! its origin connection: a generation-checked handle catches a stale
//! cross-link instead of silently aliasing a reused slot. [`conn::Conn`]
//! holds one connection's read/write buffers and its resumable parser;
//! [`engine::Engine`] is the only thing that ever holds two connections'
//! handles at once (to pair a response with its request, or to mirror a
//! warm-up read).

pub mod arena;
pub mod conn;
pub mod engine;
mod error;
mod fragment;
pub mod message;
pub mod protocol;
mod timeout;

pub use error::ProxyError;
pub use message::{Command, Msg, MsgFlags, Request, Response, ResponseShape};
