use crate::span::Span;

/// The RESP commands this parser gives fragmentation-aware treatment.
/// Every other command is forwarded as a single opaque frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespCommand {
    /// `GET <key>`, or one fragment of a multi-key `MGET`.
    Get,
    /// `SET <key> <value> ...`, or one fragment of a multi-pair `MSET`.
    Set,
    /// `DEL <key>`, or one fragment of a multi-key `DEL`.
    Del,
    /// Any command not given special fragmentation handling.
    Other,
}

/// One parsed RESP request, covering exactly one key even when it
/// originated from a multi-key `MGET`/`MSET`/`DEL`.
#[derive(Debug, Clone)]
pub struct RespRequest {
    /// The resolved command, used to decide fragmentation and response
    /// recombination.
    pub command: RespCommand,
    /// The raw command-name token as sent on the wire (e.g. `b"MGET"`),
    /// always valid even when [`Self::command`] is [`RespCommand::Other`].
    pub command_name: Span,
    /// The routed key.
    pub key: Span,
    /// `SET`'s value argument (or one pair's value, for a fragmented
    /// `MSET`).
    pub value: Option<Span>,
    /// The whole request frame (`*N\r\n...`), valid for every request;
    /// used to forward [`RespCommand::Other`] requests byte-for-byte
    /// without rebuilding them.
    pub frame: Span,
    /// Whether this is the final key of a (possibly single-key)
    /// fragment group.
    pub last_fragment: bool,
    /// Total number of sibling fragments in this request's group
    /// (`1` for anything that didn't fragment).
    pub frag_count: usize,
}

/// The handful of RESP response shapes the proxy needs to recognise:
/// enough to pass a scalar reply through untouched, or to recombine a
/// fragmented command's per-shard replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespResponseKind {
    /// `+OK\r\n` and friends.
    SimpleString,
    /// `-ERR ...\r\n`.
    Error,
    /// `:123\r\n`.
    Integer,
    /// `$<len>\r\n<bytes>\r\n`, or `$-1\r\n` when `nil`.
    Bulk,
    /// `*<n>\r\n` followed by `n` bulk/nil elements (one level deep;
    /// the proxy never needs to parse a backend-returned nested array).
    Array,
}

/// One parsed RESP response.
#[derive(Debug, Clone)]
pub struct RespResponse {
    /// The response shape.
    pub kind: RespResponseKind,
    /// Whether a [`RespResponseKind::Bulk`] or array element is the nil
    /// sentinel (`$-1\r\n`) rather than a present value.
    pub nil: bool,
    /// The parsed integer, for [`RespResponseKind::Integer`].
    pub integer: Option<i64>,
    /// The payload bytes, for [`RespResponseKind::SimpleString`],
    /// [`RespResponseKind::Error`], or a non-nil
    /// [`RespResponseKind::Bulk`].
    pub payload: Option<Span>,
    /// Element payloads, for [`RespResponseKind::Array`]; `None` per
    /// element marks a nil.
    pub elements: Vec<Option<Span>>,
    /// The whole response frame, for byte-for-byte passthrough.
    pub frame: Span,
}
