//! [`proxy_core::conn::Transport`] over a real `tokio::net::TcpStream`.
//!
//! `TcpStream::try_read`/`try_write` already have exactly the semantics
//! the trait wants (non-blocking, `WouldBlock` rather than suspending),
//! so this is a thin adapter rather than any real translation layer. The
//! stream is held behind `Rc` because both the connection's `Transport`
//! (owned by `proxy-core`'s arena) and this crate's per-connection
//! driver task (which awaits `readable()`/`writable()` to arm the next
//! poll) need their own handle to the same socket.

use std::io;
use std::rc::Rc;

use proxy_core::conn::Transport;
use tokio::net::TcpStream;

/// A connection's socket, shared between the arena-owned [`Transport`]
/// object and the task driving its readiness events.
pub struct TokioTransport {
    stream: Rc<TcpStream>,
}

impl TokioTransport {
    /// Wraps an already-connected, non-blocking stream.
    #[must_use]
    pub fn new(stream: Rc<TcpStream>) -> Self {
        Self { stream }
    }
}

impl Transport for TokioTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.try_read(buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.try_write(buf)
    }
}
