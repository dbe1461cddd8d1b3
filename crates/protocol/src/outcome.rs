use crate::error::ParseError;

/// The five outcomes an incremental parser can report.
///
/// Every position carried by this enum (`next_pos`, `token_start`,
/// `resume_at`) is an **absolute** offset into the caller's accumulated
/// read buffer, not a relative byte count — the same convention
/// [`crate::span::Span`] uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    /// One complete message was parsed; `next_pos` is where the caller
    /// resumes parsing the following message.
    Ok {
        /// The parsed message.
        message: T,
        /// Absolute offset of the first unconsumed byte.
        next_pos: usize,
    },
    /// Not enough bytes are buffered yet; call again once more bytes
    /// have arrived, starting from the same position.
    Again,
    /// The buffer reached its configured capacity while a token was
    /// still open; the caller must carry the bytes from `token_start`
    /// onward into a fresh, larger buffer and resume parsing there.
    /// This is the direct analogue of the source's fixed-size mbuf
    /// spanning — it only triggers when the caller enforces a buffer
    /// capacity, since this crate otherwise parses over one growable
    /// accumulation buffer.
    Repair {
        /// Absolute offset where the unfinished token began.
        token_start: usize,
    },
    /// A multi-key `get`/`gets` (or RESP `MGET`/`MSET`/`DEL`) request
    /// crossed into a second key; `message` covers only the first key
    /// and `resume_at` is where the caller re-enters the parser for the
    /// remaining keys under the same fragment group.
    Fragment {
        /// The completed first-key sub-message.
        message: T,
        /// Absolute offset of the next key's first byte.
        resume_at: usize,
    },
    /// The input was syntactically invalid.
    Error(ParseError),
}
