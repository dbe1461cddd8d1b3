/// A syntactically invalid request or response, corresponding to the
/// parser's `ERROR`
/// outcome. Carries enough detail to build the protocol-specific wire
/// error reply (`CLIENT_ERROR ...` / `-ERR ...`) without re-scanning.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ParseError {
    /// The command token did not match any recognised opcode.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    /// A `get`/`gets` request, or RESP `MGET`/`DEL`, named no keys.
    #[error("missing key")]
    MissingKey,
    /// A key exceeded the 250-byte protocol limit.
    #[error("key too long ({0} bytes)")]
    KeyTooLong(usize),
    /// A numeric field (`flags`, `exptime`, `vlen`, `cas`, a RESP bulk
    /// length, a RESP integer) was not a valid number.
    #[error("malformed numeric field")]
    MalformedNumber,
    /// The request's declared value length did not end in the expected
    /// trailing CRLF.
    #[error("value not terminated by CRLF")]
    UnterminatedValue,
    /// A RESP frame's leading type byte did not match `*$+-:`.
    #[error("unrecognised RESP type byte {0:#04x}")]
    UnknownRespType(u8),
    /// A RESP array or bulk string declared a negative length other
    /// than the `-1` nil sentinel.
    #[error("invalid RESP length {0}")]
    InvalidRespLength(i64),
}
