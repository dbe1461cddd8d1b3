//! The protocol-agnostic message envelope the reactor queues, routes,
//! and coalesces. A [`protocol`] parser operates zero-copy over a
//! connection's live read buffer; once it reports a complete message
//! (or fragment), this layer copies the handful of bytes it actually
//! needs into an owned [`Msg`] so the message can outlive that buffer
//! across the queue/timeout/coalesce lifetime without fighting the
//! borrow checker over a self-referential buffer.

use crate::arena::Handle;

/// The routed command family, unified across memcached and RESP so
/// `proxy-core` only branches on protocol at the parse/serialize edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// A read: memcached `get`/`gets`, or RESP `GET`/`MGET`.
    Get,
    /// A write: memcached `set`/`add`/`replace`/`append`/`prepend`/`cas`,
    /// or RESP `SET`/`MSET`.
    Set,
    /// memcached `delete`, or RESP `DEL`.
    Delete,
    /// memcached `incr`/`decr`/`quit`, or any RESP command not given
    /// special fragmentation/warm-up treatment.
    Other,
}

impl Command {
    /// Whether this command mutates backend state, for the range
    /// distributor's read/write tag-lane split. Only [`Self::Get`] is a
    /// pure read; everything else (including `Other`, which covers
    /// `incr`/`decr` and any command this layer doesn't special-case) is
    /// treated as a write, so an unrecognized command never gets routed
    /// to a read-only replica.
    #[must_use]
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Get)
    }
}

/// The response shape, unified enough for fragment recombination and
/// passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// A cache hit carrying a value (memcached `VALUE`, RESP bulk).
    Value,
    /// A cache miss or completed stream terminator (memcached `END`,
    /// RESP nil bulk).
    Miss,
    /// A scalar acknowledgement (`STORED`, `DELETED`, RESP `+OK`,
    /// `:1`, ...), forwarded byte-for-byte.
    Scalar,
    /// A protocol-level error (`ERROR`/`CLIENT_ERROR`/`SERVER_ERROR`,
    /// RESP `-ERR`).
    Error,
}

/// One request, or one fragment of a multi-key request, queued for
/// routing and forwarding.
#[derive(Debug, Clone)]
pub struct Request {
    /// The command family.
    pub command: Command,
    /// The routed key (for `Other`, this is the command's first
    /// argument, used only for logging; routing does not consult it).
    pub key: Vec<u8>,
    /// The value payload, for `Set`.
    pub value: Option<Vec<u8>>,
    /// The exact bytes to forward to the backend, already rewritten to
    /// a single-key primitive when this is a fragment of a multi-key
    /// request.
    pub wire: Vec<u8>,
    /// Whether the client suppressed the response (memcached `noreply`).
    pub noreply: bool,
    /// Whether the client sent `quit` (memcached only); the owning
    /// client connection closes once this request's (absent) response
    /// cycle completes.
    pub quit: bool,
    /// Whether this is the final key of a (possibly single-key)
    /// fragment group; always `true` for a request that never
    /// fragmented, so callers don't need to special-case `frag_id ==
    /// None` to find the group's close.
    pub last_fragment: bool,
}

/// One response, or one fragment of a multi-key response, received from
/// a backend.
#[derive(Debug, Clone)]
pub struct Response {
    /// The response shape.
    pub shape: ResponseShape,
    /// `VALUE`'s key, when present (needed to rebuild a RESP array
    /// response in request order, and to address warm-up write-back).
    pub key: Option<Vec<u8>>,
    /// `VALUE`'s flags, memcached only.
    pub flags: Option<u32>,
    /// The value payload, for [`ResponseShape::Value`].
    pub value: Option<Vec<u8>>,
    /// The exact bytes received from the backend for this response (or
    /// fragment), before any coalescing rewrite.
    pub wire: Vec<u8>,
    /// A RESP `:<n>` integer reply's value, used to sum per-fragment
    /// `DEL` counts back into one reply.
    pub integer: Option<i64>,
    /// A memcached `STAT` probe response's key/value pairs; empty for
    /// every other response shape.
    pub stats: Vec<(Vec<u8>, Vec<u8>)>,
}

/// Per-message bookkeeping the reactor mutates as a request/response
/// pair moves through routing, forwarding, and coalescing.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgFlags {
    /// Set once this message's half of its pair has been fully written.
    pub done: bool,
    /// Set once a parse, routing, or transport error occurred; sealed
    /// onto the whole fragment vector via `ferror` semantics once one
    /// child reports it.
    pub error: bool,
    /// The response side must not be delivered to any client (probe,
    /// warm-up mirror, message-queue notify, or an orphaned request
    /// whose client already disconnected).
    pub swallow: bool,
    /// The last child of a (possibly single-fragment) group.
    pub last_fragment: bool,
}

/// One request or response, queued and cross-linked through
/// [`Handle`]s rather than raw pointers.
#[derive(Debug, Clone)]
pub struct Msg {
    /// Monotonic allocation order, used only for diagnostics.
    pub id: u64,
    /// The parsed request, when this message is inbound from a client.
    pub request: Option<Request>,
    /// The parsed response, when this message is inbound from a server.
    pub response: Option<Response>,
    /// The paired message: a request's response, or a response's
    /// request. `None` until the pairing occurs on response receipt.
    pub peer: Option<Handle<Msg>>,
    /// The connection that originally received this message.
    pub owner: Option<Handle<crate::conn::Conn>>,
    /// For a request, the server connection it was forwarded to.
    pub target: Option<Handle<crate::conn::Conn>>,
    /// Set when this request was rerouted to a peer pool for warm-up:
    /// the original (cold) server connection the write-back eventually
    /// targets.
    pub origin: Option<Handle<crate::conn::Conn>>,
    /// Shared identifier for every child of a fragmented multi-key
    /// request, so the coalescer can recognise sibling fragments without
    /// a back-pointer to a hidden group owner.
    pub frag_id: Option<u64>,
    /// Total sibling count in this fragment's group (`1` when it never
    /// fragmented).
    pub frag_count: usize,
    /// Mutable lifecycle flags.
    pub flags: MsgFlags,
}

impl Msg {
    /// Builds a request message with default (unset) flags and links.
    #[must_use]
    pub fn new_request(id: u64, request: Request, frag_id: Option<u64>, frag_count: usize, last_fragment: bool) -> Self {
        Self {
            id,
            request: Some(request),
            response: None,
            peer: None,
            owner: None,
            target: None,
            origin: None,
            frag_id,
            frag_count,
            flags: MsgFlags { last_fragment, ..MsgFlags::default() },
        }
    }

    /// Builds a response message, paired to `peer` up front.
    #[must_use]
    pub fn new_response(id: u64, response: Response, peer: Handle<Msg>) -> Self {
        Self {
            id,
            request: None,
            response: Some(response),
            peer: Some(peer),
            owner: None,
            target: None,
            origin: None,
            frag_id: None,
            frag_count: 1,
            flags: MsgFlags::default(),
        }
    }
}
