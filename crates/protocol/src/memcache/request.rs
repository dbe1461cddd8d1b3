//! Memcached-ASCII request parser.
//!
//! States: `START -> REQ_TYPE -> SPACES_BEFORE_KEY -> KEY ->
//! (SPACES_BEFORE_KEYS | SPACES_BEFORE_FLAGS | SPACES_BEFORE_NUM |
//! RUNTO_CRLF) -> ... -> ALMOST_DONE`. This implementation collapses the
//! token-by-token states into a single whitespace tokenizer run once the
//! terminating CRLF of the command line is known to be present — the
//! line is always fully buffered before any token is inspected, which is
//! equivalent to the character-at-a-time FSM for every case this parser
//! needs to resume (see [`crate::outcome::ParseOutcome`] for where true
//! incrementality still applies: awaiting more input, awaiting a
//! storage command's value body, and multi-key fragmentation).

use crate::error::ParseError;
use crate::memcache::message::{MemcacheOpcode, MemcacheRequest};
use crate::outcome::ParseOutcome;
use crate::span::Span;

const MAX_KEY_LEN: usize = 250;
const CRLF: &[u8] = b"\r\n";

/// Resumable memcached-ASCII request parser.
#[derive(Debug, Clone, Default)]
pub struct RequestParser {
    state: State,
}

#[derive(Debug, Clone, Default)]
enum State {
    #[default]
    Fresh,
    /// Mid multi-key `get`/`gets`: the next call starts at a key token,
    /// not a fresh command line.
    ContinuingKeys { opcode: MemcacheOpcode },
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    memchr::memmem::find(&buf[from..], CRLF).map(|rel| from + rel)
}

/// Splits `buf[start..end]` on ASCII whitespace, returning each token's
/// span with absolute offsets.
fn tokenize(buf: &[u8], start: usize, end: usize) -> Vec<Span> {
    let mut tokens = Vec::new();
    let mut i = start;
    while i < end {
        while i < end && buf[i] == b' ' {
            i += 1;
        }
        let token_start = i;
        while i < end && buf[i] != b' ' {
            i += 1;
        }
        if i > token_start {
            tokens.push(Span::new(token_start, i));
        }
    }
    tokens
}

fn parse_u32(buf: &[u8], span: Span) -> Result<u32, ParseError> {
    std::str::from_utf8(span.slice(buf))
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::MalformedNumber)
}

fn parse_u64(buf: &[u8], span: Span) -> Result<u64, ParseError> {
    std::str::from_utf8(span.slice(buf))
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::MalformedNumber)
}

fn parse_usize(buf: &[u8], span: Span) -> Result<usize, ParseError> {
    std::str::from_utf8(span.slice(buf))
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::MalformedNumber)
}

fn get_request(key: Span, last_fragment: bool, gets: bool) -> MemcacheRequest {
    MemcacheRequest {
        opcode: if gets { MemcacheOpcode::Gets } else { MemcacheOpcode::Get },
        key,
        flags: None,
        exptime: None,
        vlen: None,
        value: None,
        cas: None,
        delta: None,
        noreply: false,
        last_fragment,
    }
}

impl RequestParser {
    /// Creates a parser starting in its initial `Fresh` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one request (or request fragment) starting at `pos`.
    ///
    /// `cap`, if given, bounds how large the buffer is allowed to grow
    /// before an unterminated token becomes [`ParseOutcome::Repair`]
    /// instead of [`ParseOutcome::Again`].
    pub fn parse(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<MemcacheRequest> {
        match self.state.clone() {
            State::Fresh => self.parse_fresh(buf, pos, cap),
            State::ContinuingKeys { opcode } => self.parse_key_continuation(buf, pos, cap, opcode),
        }
    }

    fn awaiting(buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<MemcacheRequest> {
        match cap {
            Some(cap) if buf.len() >= cap => ParseOutcome::Repair { token_start: pos },
            _ => ParseOutcome::Again,
        }
    }

    fn parse_fresh(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<MemcacheRequest> {
        let Some(crlf) = find_crlf(buf, pos) else {
            return Self::awaiting(buf, pos, cap);
        };
        let line_end = crlf + CRLF.len();
        let tokens = tokenize(buf, pos, crlf);

        let Some(opcode_token) = tokens.first() else {
            return ParseOutcome::Error(ParseError::UnknownCommand(String::new()));
        };
        let Some(opcode) = MemcacheOpcode::from_token(opcode_token.slice(buf)) else {
            return ParseOutcome::Error(ParseError::UnknownCommand(
                String::from_utf8_lossy(opcode_token.slice(buf)).into_owned(),
            ));
        };

        match opcode {
            MemcacheOpcode::Quit => ParseOutcome::Ok {
                message: MemcacheRequest {
                    opcode,
                    key: Span::new(pos, pos),
                    flags: None,
                    exptime: None,
                    vlen: None,
                    value: None,
                    cas: None,
                    delta: None,
                    noreply: false,
                    last_fragment: true,
                },
                next_pos: line_end,
            },
            MemcacheOpcode::Get | MemcacheOpcode::Gets => {
                self.parse_get(buf, &tokens, opcode == MemcacheOpcode::Gets, line_end)
            }
            MemcacheOpcode::Delete => self.parse_delete(buf, &tokens, line_end),
            MemcacheOpcode::Incr | MemcacheOpcode::Decr => {
                self.parse_arith(buf, &tokens, opcode, line_end)
            }
            _ => self.parse_storage(buf, &tokens, opcode, line_end, cap),
        }
    }

    fn parse_get(
        &mut self,
        buf: &[u8],
        tokens: &[Span],
        gets: bool,
        line_end: usize,
    ) -> ParseOutcome<MemcacheRequest> {
        let Some(&key) = tokens.get(1) else {
            return ParseOutcome::Error(ParseError::MissingKey);
        };
        if key.len() > MAX_KEY_LEN {
            return ParseOutcome::Error(ParseError::KeyTooLong(key.len()));
        }
        if let Some(&next_key) = tokens.get(2) {
            let opcode = if gets { MemcacheOpcode::Gets } else { MemcacheOpcode::Get };
            self.state = State::ContinuingKeys { opcode };
            ParseOutcome::Fragment {
                message: get_request(key, false, gets),
                resume_at: next_key.start,
            }
        } else {
            ParseOutcome::Ok {
                message: get_request(key, true, gets),
                next_pos: line_end,
            }
        }
    }

    fn parse_key_continuation(
        &mut self,
        buf: &[u8],
        pos: usize,
        cap: Option<usize>,
        opcode: MemcacheOpcode,
    ) -> ParseOutcome<MemcacheRequest> {
        let Some(crlf) = find_crlf(buf, pos) else {
            return Self::awaiting(buf, pos, cap);
        };
        let line_end = crlf + CRLF.len();
        let tokens = tokenize(buf, pos, crlf);
        let Some(&key) = tokens.first() else {
            return ParseOutcome::Error(ParseError::MissingKey);
        };
        if key.len() > MAX_KEY_LEN {
            return ParseOutcome::Error(ParseError::KeyTooLong(key.len()));
        }
        let gets = opcode == MemcacheOpcode::Gets;
        if let Some(&next_key) = tokens.get(1) {
            ParseOutcome::Fragment {
                message: get_request(key, false, gets),
                resume_at: next_key.start,
            }
        } else {
            self.state = State::Fresh;
            ParseOutcome::Ok {
                message: get_request(key, true, gets),
                next_pos: line_end,
            }
        }
    }

    fn parse_delete(&mut self, buf: &[u8], tokens: &[Span], line_end: usize) -> ParseOutcome<MemcacheRequest> {
        let Some(&key) = tokens.get(1) else {
            return ParseOutcome::Error(ParseError::MissingKey);
        };
        if key.len() > MAX_KEY_LEN {
            return ParseOutcome::Error(ParseError::KeyTooLong(key.len()));
        }
        let noreply = tokens.get(2).is_some_and(|t| t.slice(buf) == b"noreply");
        ParseOutcome::Ok {
            message: MemcacheRequest {
                opcode: MemcacheOpcode::Delete,
                key,
                flags: None,
                exptime: None,
                vlen: None,
                value: None,
                cas: None,
                delta: None,
                noreply,
                last_fragment: true,
            },
            next_pos: line_end,
        }
    }

    fn parse_arith(
        &mut self,
        buf: &[u8],
        tokens: &[Span],
        opcode: MemcacheOpcode,
        line_end: usize,
    ) -> ParseOutcome<MemcacheRequest> {
        let (Some(&key), Some(&delta_tok)) = (tokens.get(1), tokens.get(2)) else {
            return ParseOutcome::Error(ParseError::MissingKey);
        };
        if key.len() > MAX_KEY_LEN {
            return ParseOutcome::Error(ParseError::KeyTooLong(key.len()));
        }
        let delta = match parse_u64(buf, delta_tok) {
            Ok(d) => d,
            Err(e) => return ParseOutcome::Error(e),
        };
        let noreply = tokens.get(3).is_some_and(|t| t.slice(buf) == b"noreply");
        ParseOutcome::Ok {
            message: MemcacheRequest {
                opcode,
                key,
                flags: None,
                exptime: None,
                vlen: None,
                value: None,
                cas: None,
                delta: Some(delta),
                noreply,
                last_fragment: true,
            },
            next_pos: line_end,
        }
    }

    fn parse_storage(
        &mut self,
        buf: &[u8],
        tokens: &[Span],
        opcode: MemcacheOpcode,
        line_end: usize,
        cap: Option<usize>,
    ) -> ParseOutcome<MemcacheRequest> {
        let needs_cas = opcode == MemcacheOpcode::Cas;
        let min_tokens = if needs_cas { 6 } else { 5 };
        if tokens.len() < min_tokens {
            return ParseOutcome::Error(ParseError::MissingKey);
        }
        let key = tokens[1];
        if key.len() > MAX_KEY_LEN {
            return ParseOutcome::Error(ParseError::KeyTooLong(key.len()));
        }
        let flags = match parse_u32(buf, tokens[2]) {
            Ok(v) => v,
            Err(e) => return ParseOutcome::Error(e),
        };
        let exptime = match parse_u32(buf, tokens[3]) {
            Ok(v) => v,
            Err(e) => return ParseOutcome::Error(e),
        };
        let vlen = match parse_usize(buf, tokens[4]) {
            Ok(v) => v,
            Err(e) => return ParseOutcome::Error(e),
        };
        let mut idx = 5;
        let cas = if needs_cas {
            let cas = match parse_u64(buf, tokens[5]) {
                Ok(v) => v,
                Err(e) => return ParseOutcome::Error(e),
            };
            idx = 6;
            Some(cas)
        } else {
            None
        };
        let noreply = tokens.get(idx).is_some_and(|t| t.slice(buf) == b"noreply");

        let val_start = line_end;
        let val_end = val_start + vlen;
        if buf.len() < val_end + CRLF.len() {
            return Self::awaiting(buf, val_start, cap);
        }
        if &buf[val_end..val_end + CRLF.len()] != CRLF {
            return ParseOutcome::Error(ParseError::UnterminatedValue);
        }

        ParseOutcome::Ok {
            message: MemcacheRequest {
                opcode,
                key,
                flags: Some(flags),
                exptime: Some(exptime),
                vlen: Some(vlen),
                value: Some(Span::new(val_start, val_end)),
                cas,
                delta: None,
                noreply,
                last_fragment: true,
            },
            next_pos: val_end + CRLF.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &[u8]) -> ParseOutcome<MemcacheRequest> {
        RequestParser::new().parse(input, 0, None)
    }

    #[test]
    fn parses_simple_get() {
        let outcome = parse_one(b"get foo\r\n");
        match outcome {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.key, Span::new(4, 7));
                assert!(message.last_fragment);
                assert_eq!(next_pos, 9);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn multi_key_get_fragments() {
        let buf = b"get k1 k2 k3\r\n";
        let mut parser = RequestParser::new();
        let first = parser.parse(buf, 0, None);
        let ParseOutcome::Fragment { message, resume_at } = first else {
            panic!("expected fragment, got {first:?}");
        };
        assert_eq!(message.key.slice(buf), b"k1");
        assert_eq!(resume_at, 7);

        let second = parser.parse(buf, resume_at, None);
        let ParseOutcome::Fragment { message, resume_at } = second else {
            panic!("expected fragment, got {second:?}");
        };
        assert_eq!(message.key.slice(buf), b"k2");

        let third = parser.parse(buf, resume_at, None);
        match third {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.key.slice(buf), b"k3");
                assert!(message.last_fragment);
                assert_eq!(next_pos, buf.len());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn set_waits_for_value_body() {
        let buf = b"set foo 0 0 5\r\n";
        let outcome = parse_one(buf);
        assert_eq!(outcome, ParseOutcome::Again);
    }

    #[test]
    fn set_completes_once_value_and_crlf_arrive() {
        let buf = b"set foo 0 0 5\r\nhello\r\n";
        let outcome = parse_one(buf);
        match outcome {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.value.unwrap().slice(buf), b"hello");
                assert_eq!(next_pos, buf.len());
                assert!(!message.noreply);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn set_recognises_trailing_noreply() {
        let buf = b"set foo 0 0 5 noreply\r\nhello\r\n";
        let outcome = parse_one(buf);
        match outcome {
            ParseOutcome::Ok { message, .. } => assert!(message.noreply),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rejects_key_over_250_bytes() {
        let key = "k".repeat(251);
        let line = format!("get {key}\r\n");
        let outcome = parse_one(line.as_bytes());
        assert_eq!(outcome, ParseOutcome::Error(ParseError::KeyTooLong(251)));
    }

    #[test]
    fn rejects_unknown_command() {
        let outcome = parse_one(b"frobnicate x\r\n");
        assert!(matches!(outcome, ParseOutcome::Error(ParseError::UnknownCommand(_))));
    }

    #[test]
    fn quit_sets_the_quit_opcode() {
        let outcome = parse_one(b"quit\r\n");
        match outcome {
            ParseOutcome::Ok { message, .. } => assert_eq!(message.opcode, MemcacheOpcode::Quit),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn incomplete_line_is_again() {
        assert_eq!(parse_one(b"get fo"), ParseOutcome::Again);
    }

    #[test]
    fn splitting_a_request_at_any_byte_yields_the_same_message() {
        let buf = b"set foo 1 2 5\r\nhello\r\n";
        for split in 0..buf.len() {
            let (head, tail) = buf.split_at(split);
            let mut staged = head.to_vec();
            let mut parser = RequestParser::new();
            loop {
                match parser.parse(&staged, 0, None) {
                    ParseOutcome::Again => {
                        staged.extend_from_slice(tail);
                        tail.len(); // tail already fully appended; loop will re-check
                        if staged.len() == buf.len() {
                            continue;
                        }
                        break;
                    }
                    ParseOutcome::Ok { message, .. } => {
                        assert_eq!(message.value.unwrap().slice(&staged), b"hello");
                        break;
                    }
                    other => panic!("unexpected outcome at split {split}: {other:?}"),
                }
            }
        }
    }
}
