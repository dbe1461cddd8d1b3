use crate::span::Span;

/// The twelve opcodes this parser recognises by exact byte compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemcacheOpcode {
    /// `get <key>*`
    Get,
    /// `gets <key>*`
    Gets,
    /// `set <key> <flags> <exptime> <vlen> [noreply]`
    Set,
    /// `add <key> <flags> <exptime> <vlen> [noreply]`
    Add,
    /// `cas <key> <flags> <exptime> <vlen> <cas> [noreply]`
    Cas,
    /// `replace <key> <flags> <exptime> <vlen> [noreply]`
    Replace,
    /// `append <key> <flags> <exptime> <vlen> [noreply]`
    Append,
    /// `prepend <key> <flags> <exptime> <vlen> [noreply]`
    Prepend,
    /// `incr <key> <delta> [noreply]`
    Incr,
    /// `decr <key> <delta> [noreply]`
    Decr,
    /// `delete <key> [noreply]`
    Delete,
    /// `quit`
    Quit,
}

impl MemcacheOpcode {
    /// Matches the command token by exact byte compare.
    #[must_use]
    pub fn from_token(token: &[u8]) -> Option<Self> {
        Some(match token {
            b"get" => Self::Get,
            b"gets" => Self::Gets,
            b"set" => Self::Set,
            b"add" => Self::Add,
            b"cas" => Self::Cas,
            b"replace" => Self::Replace,
            b"append" => Self::Append,
            b"prepend" => Self::Prepend,
            b"incr" => Self::Incr,
            b"decr" => Self::Decr,
            b"delete" => Self::Delete,
            b"quit" => Self::Quit,
            _ => return None,
        })
    }

    /// Whether this opcode's grammar accepts a trailing `noreply`
    /// token (recognised only for storage/arithmetic/delete commands).
    #[must_use]
    pub fn accepts_noreply(self) -> bool {
        !matches!(self, Self::Get | Self::Gets | Self::Quit)
    }

    /// Whether this opcode carries a `<vlen>`-declared value body.
    #[must_use]
    pub fn has_value_body(self) -> bool {
        matches!(
            self,
            Self::Set | Self::Add | Self::Cas | Self::Replace | Self::Append | Self::Prepend
        )
    }
}

/// One parsed memcached-ASCII request, covering exactly one key even
/// for a multi-key `get`/`gets` request.
#[derive(Debug, Clone)]
pub struct MemcacheRequest {
    /// The command.
    pub opcode: MemcacheOpcode,
    /// The routed key.
    pub key: Span,
    /// `<flags>`, for storage commands.
    pub flags: Option<u32>,
    /// `<exptime>`, for storage commands.
    pub exptime: Option<u32>,
    /// `<vlen>`, for storage commands.
    pub vlen: Option<usize>,
    /// The value body, present once the declared `vlen` bytes plus
    /// trailing CRLF have arrived.
    pub value: Option<Span>,
    /// `<cas>` token, for `cas` only.
    pub cas: Option<u64>,
    /// `<delta>`, for `incr`/`decr`.
    pub delta: Option<u64>,
    /// Whether the client suppressed the response.
    pub noreply: bool,
    /// Whether this is the final key of a (possibly single-key) get
    /// family request; always `true` for non-`get`/`gets` opcodes.
    pub last_fragment: bool,
}

/// The eleven response tokens this parser recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemcacheResponseKind {
    /// Terminal marker for a `get`/`gets`/`stats` stream.
    End,
    /// One line of a `stats` response.
    Stat,
    /// A cache hit within a `get`/`gets` stream.
    Value,
    /// A malformed-command error.
    Error,
    /// A successful storage command.
    Stored,
    /// `cas` found a mismatched CAS value.
    Exists,
    /// `delete` on a present key.
    Deleted,
    /// A lookup found no matching key.
    NotFound,
    /// `add`/`replace`/`cas` on a key whose existence contradicted the
    /// request semantics.
    NotStored,
    /// A protocol-level client error.
    ClientError,
    /// A backend-side server error.
    ServerError,
}

/// One parsed memcached-ASCII response.
#[derive(Debug, Clone)]
pub struct MemcacheResponse {
    /// The response token.
    pub kind: MemcacheResponseKind,
    /// `VALUE`'s key.
    pub key: Option<Span>,
    /// `VALUE`'s flags token.
    pub flags: Option<Span>,
    /// `VALUE`'s declared value length.
    pub vlen: Option<usize>,
    /// `VALUE`'s value body, once fully read.
    pub value: Option<Span>,
    /// `STAT`/`ERROR`/`CLIENT_ERROR`/`SERVER_ERROR` free-text payload.
    pub text: Option<Span>,
    /// `STAT` key/value pairs accumulated across one probe response.
    pub stats: Vec<(Span, Span)>,
    /// Whether an `END\r\n` terminator has been consumed for this
    /// response (a single `VALUE` response still awaits it; a `STORED`
    /// etc. response has none to wait for).
    pub terminated: bool,
}
