//! A connection's byte-stream plumbing: growable read/write buffers, the
//! resumable parser straddling them, and the two message queues the
//! reactor drains. Socket I/O itself is abstracted behind [`Transport`]
//! so this crate never touches a real file descriptor; `server` supplies
//! a `tokio::net::TcpStream` implementation (using its own non-blocking
//! `try_read`/`try_write`, armed by the socket's readiness events, never
//! `.await`ed) and `test-support` supplies an in-memory double. The
//! transport is boxed rather than a type parameter threaded through
//! `Conn`/`Msg`/`Engine`: a connection's backing stream is a capability
//! resolved once at construction and never needs monomorphising per
//! call site, and a single engine must hold both real and (in tests)
//! fake connections side by side in the same arena.

use std::collections::VecDeque;
use std::io;

use crate::arena::Handle;
use crate::message::Msg;
use crate::protocol::{Protocol, RequestParser, ResponseParser};

/// A non-blocking byte stream. `try_read`/`try_write` must behave like
/// `TcpStream::try_read`/`try_write`: return
/// `Err(ErrorKind::WouldBlock)` rather than suspending when the socket
/// is not ready, so a single-threaded reactor can poll many connections
/// without ever blocking on one.
pub trait Transport {
    /// Reads into `buf`, returning the byte count or `WouldBlock`.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Writes from `buf`, returning the byte count or `WouldBlock`.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// Which side of the proxy a connection terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A client speaking to the proxy's listen socket.
    Client,
    /// A persistent upstream connection to a backend server (including
    /// gutter, peer, and message-queue connections, which are `Server`
    /// connections owned by a pool other than the one that enqueued the
    /// request).
    Server,
}

/// A read or write failure on a connection's transport; distinct from
/// [`crate::error::ProxyError`] because it carries the raw `io::Error`
/// for logging rather than being a reply-able protocol condition.
#[derive(Debug)]
pub struct ConnError {
    /// The underlying I/O failure, or `None` for a clean EOF.
    pub source: Option<io::Error>,
}

/// The read side's cumulative buffer and parse cursor, plus the write
/// side's pending output, with the two message queues and the
/// currently in-flight slots the orchestration layer cross-links.
pub struct Conn {
    /// Which role this connection plays.
    pub role: Role,
    /// The underlying non-blocking stream.
    pub transport: Box<dyn Transport>,
    /// The wire protocol this connection's pool speaks.
    pub protocol: Protocol,
    /// The request parser, present for [`Role::Client`] connections.
    pub request_parser: Option<RequestParser>,
    /// The response parser, present for [`Role::Server`] connections.
    pub response_parser: Option<ResponseParser>,
    /// Accumulated bytes read from the transport, not yet fully parsed.
    pub read_buf: Vec<u8>,
    /// The parser's resume cursor into `read_buf`.
    pub parse_pos: usize,
    /// Bytes queued to write, not yet accepted by the transport.
    pub write_buf: Vec<u8>,
    /// How many leading bytes of `write_buf` the transport has already
    /// accepted.
    pub write_pos: usize,
    /// Sent requests awaiting their response (server connections), or
    /// in-flight request/response pairs awaiting write-back in arrival
    /// order (client connections).
    pub omsg_q: VecDeque<Handle<Msg>>,
    /// Set once a connect attempt is outstanding (server connections).
    pub connecting: bool,
    /// Set once the transport has completed its handshake.
    pub connected: bool,
    /// Set once the transport reported EOF.
    pub eof: bool,
    /// Set once this connection is scheduled for the reactor to close
    /// once its write buffer drains; no further reads are issued.
    pub done: bool,
    /// The failure that triggered `done`, if any.
    pub err: Option<ConnError>,
    /// The pool this connection belongs to (for a client: the pool its
    /// listener is configured for, subject to virtual-pool rerouting;
    /// for a server: the pool that owns this persistent connection).
    pub pool_name: String,
    /// The server index within `pool_name`, for [`Role::Server`]
    /// connections.
    pub server_index: Option<usize>,
    /// The fragment group currently being streamed out of the parser,
    /// if a multi-key request's children are still arriving; client
    /// connections only. A connection parses one request line at a
    /// time, so at most one group can be open here.
    pub pending_frag: Option<u64>,
}

/// Read buffers grow in 16 KiB steps, matching a conservative mbuf-sized
/// chunk; large values simply trigger repeated grows rather than a
/// single oversized allocation per connection.
const READ_CHUNK: usize = 16 * 1024;

impl Conn {
    /// Builds a connection in its initial (not yet connected) state.
    #[must_use]
    pub fn new(role: Role, transport: Box<dyn Transport>, protocol: Protocol, pool_name: String, server_index: Option<usize>) -> Self {
        let (request_parser, response_parser) = match role {
            Role::Client => (Some(protocol.request_parser()), None),
            Role::Server => (None, Some(protocol.response_parser())),
        };
        Self {
            role,
            transport,
            protocol,
            request_parser,
            response_parser,
            read_buf: Vec::new(),
            parse_pos: 0,
            write_buf: Vec::new(),
            write_pos: 0,
            omsg_q: VecDeque::new(),
            connecting: false,
            connected: false,
            eof: false,
            done: false,
            err: None,
            pool_name,
            server_index,
            pending_frag: None,
        }
    }

    /// Whether this connection still has work the reactor should arm
    /// writability for.
    #[must_use]
    pub fn has_pending_write(&self) -> bool {
        self.write_pos < self.write_buf.len()
    }

    /// Queues bytes for the next writable tick; returns `true` if the
    /// output side was idle (so the caller should arm writability).
    pub fn queue_output(&mut self, bytes: &[u8]) -> bool {
        let was_idle = !self.has_pending_write();
        self.write_buf.extend_from_slice(bytes);
        was_idle
    }

    /// Reads as many bytes as the transport offers without blocking,
    /// appending to `read_buf`. Returns `Ok(true)` if EOF was reached,
    /// `Ok(false)` if the transport would now block, or the I/O error.
    pub fn fill_read_buf(&mut self) -> io::Result<bool> {
        loop {
            let start = self.read_buf.len();
            self.read_buf.resize(start + READ_CHUNK, 0);
            match self.transport.try_read(&mut self.read_buf[start..]) {
                Ok(0) => {
                    self.read_buf.truncate(start);
                    self.eof = true;
                    return Ok(true);
                }
                Ok(n) => {
                    self.read_buf.truncate(start + n);
                    if n < READ_CHUNK {
                        return Ok(false);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.read_buf.truncate(start);
                    return Ok(false);
                }
                Err(e) => {
                    self.read_buf.truncate(start);
                    return Err(e);
                }
            }
        }
    }

    /// Drops the fully-parsed prefix of `read_buf`, sliding `parse_pos`
    /// back to zero so the buffer does not grow unboundedly across a
    /// long-lived connection's lifetime.
    pub fn compact_read_buf(&mut self) {
        if self.parse_pos == 0 {
            return;
        }
        self.read_buf.drain(0..self.parse_pos);
        self.parse_pos = 0;
    }

    /// Writes as much of `write_buf[write_pos..]` as the transport
    /// accepts without blocking. Returns `Ok(true)` once the whole
    /// buffer has been accepted (the caller should disarm writability
    /// and compact the buffer).
    pub fn drain_write_buf(&mut self) -> io::Result<bool> {
        while self.write_pos < self.write_buf.len() {
            match self.transport.try_write(&self.write_buf[self.write_pos..]) {
                Ok(0) => return Ok(false),
                Ok(n) => self.write_pos += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        self.write_buf.clear();
        self.write_pos = 0;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque as Deque;
    use std::rc::Rc;

    struct ScriptedTransport {
        reads: Deque<io::Result<Vec<u8>>>,
        written: Rc<RefCell<Vec<u8>>>,
    }

    impl Transport for ScriptedTransport {
        fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            }
        }

        fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn scripted(reads: Vec<io::Result<Vec<u8>>>) -> (Box<dyn Transport>, Rc<RefCell<Vec<u8>>>) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let transport = ScriptedTransport { reads: Deque::from(reads), written: written.clone() };
        (Box::new(transport), written)
    }

    #[test]
    fn fill_read_buf_stops_on_would_block() {
        let (transport, _) = scripted(vec![Ok(b"get foo\r\n".to_vec())]);
        let mut conn = Conn::new(Role::Client, transport, Protocol::Memcache, "pool".into(), None);
        let eof = conn.fill_read_buf().unwrap();
        assert!(!eof);
        assert_eq!(conn.read_buf, b"get foo\r\n");
    }

    #[test]
    fn fill_read_buf_reports_eof_on_zero_read() {
        let (transport, _) = scripted(vec![Ok(Vec::new())]);
        let mut conn = Conn::new(Role::Server, transport, Protocol::Memcache, "pool".into(), Some(0));
        let eof = conn.fill_read_buf().unwrap();
        assert!(eof);
        assert!(conn.eof);
    }

    #[test]
    fn drain_write_buf_clears_once_fully_accepted() {
        let (transport, written) = scripted(vec![]);
        let mut conn = Conn::new(Role::Server, transport, Protocol::Memcache, "pool".into(), Some(0));
        assert!(conn.queue_output(b"get foo\r\n"));
        let done = conn.drain_write_buf().unwrap();
        assert!(done);
        assert_eq!(*written.borrow(), b"get foo\r\n");
        assert!(!conn.has_pending_write());
    }

    #[test]
    fn queue_output_reports_idle_only_on_first_enqueue() {
        let (transport, _) = scripted(vec![]);
        let mut conn = Conn::new(Role::Server, transport, Protocol::Memcache, "pool".into(), Some(0));
        assert!(conn.queue_output(b"a"));
        assert!(!conn.queue_output(b"b"));
    }
}
