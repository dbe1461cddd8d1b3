//! RESP request parser.
//!
//! A request is always a multi-bulk array (`*N\r\n` followed by `N`
//! `$len\r\n<bytes>\r\n` elements); this parser buffers the whole frame
//! before inspecting any element, since RESP does not declare an
//! element count small enough to make partial dispatch worthwhile. Once
//! a frame is fully buffered, `MGET`/`MSET`/`DEL` carrying more than one
//! key are fragmented exactly like memcached's multi-key `get`: each
//! fragment is re-expressed as the single-key primitive (`GET`/`SET`/
//! `DEL`) so it can be routed and, on the response side, recombined
//! into the shape the client originally asked for.

use std::collections::VecDeque;

use crate::error::ParseError;
use crate::outcome::ParseOutcome;
use crate::resp::message::{RespCommand, RespRequest};
use crate::span::Span;

const CRLF: &[u8] = b"\r\n";

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    memchr::memmem::find(&buf[from..], CRLF).map(|rel| from + rel)
}

fn parse_i64(buf: &[u8], start: usize, end: usize) -> Result<i64, ParseError> {
    std::str::from_utf8(&buf[start..end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::MalformedNumber)
}

/// Resumable RESP request parser.
#[derive(Debug, Clone, Default)]
pub struct RespRequestParser {
    state: State,
}

#[derive(Debug, Clone, Default)]
enum State {
    #[default]
    Fresh,
    Fragmenting {
        command: RespCommand,
        command_name: Span,
        frame: Span,
        pairs: VecDeque<(Span, Option<Span>)>,
        frag_count: usize,
    },
}

fn request_from(
    command: RespCommand,
    command_name: Span,
    key: Span,
    value: Option<Span>,
    frame: Span,
    last_fragment: bool,
    frag_count: usize,
) -> RespRequest {
    RespRequest { command, command_name, key, value, frame, last_fragment, frag_count }
}

impl RespRequestParser {
    /// Creates a parser starting in its initial `Fresh` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one request (or request fragment) starting at `pos`.
    pub fn parse(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<RespRequest> {
        match self.state.clone() {
            State::Fresh => self.parse_fresh(buf, pos, cap),
            State::Fragmenting { command, command_name, frame, mut pairs, frag_count } => {
                let (key, value) = pairs.pop_front().expect("fragmenting state always has a pair");
                if pairs.is_empty() {
                    self.state = State::Fresh;
                    ParseOutcome::Ok {
                        message: request_from(command, command_name, key, value, frame, true, frag_count),
                        next_pos: frame.end,
                    }
                } else {
                    self.state = State::Fragmenting { command, command_name, frame, pairs, frag_count };
                    ParseOutcome::Fragment {
                        message: request_from(command, command_name, key, value, frame, false, frag_count),
                        resume_at: frame.end,
                    }
                }
            }
        }
    }

    fn awaiting(buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<RespRequest> {
        match cap {
            Some(cap) if buf.len() >= cap => ParseOutcome::Repair { token_start: pos },
            _ => ParseOutcome::Again,
        }
    }

    fn parse_fresh(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<RespRequest> {
        if pos >= buf.len() {
            return Self::awaiting(buf, pos, cap);
        }
        if buf[pos] != b'*' {
            return ParseOutcome::Error(ParseError::UnknownRespType(buf[pos]));
        }
        let Some(count_crlf) = find_crlf(buf, pos + 1) else {
            return Self::awaiting(buf, pos, cap);
        };
        let count = match parse_i64(buf, pos + 1, count_crlf) {
            Ok(n) => n,
            Err(e) => return ParseOutcome::Error(e),
        };
        if count <= 0 {
            return ParseOutcome::Error(ParseError::MissingKey);
        }
        let count = count as usize;

        let mut cursor = count_crlf + CRLF.len();
        let mut tokens = Vec::with_capacity(count);
        for _ in 0..count {
            if cursor >= buf.len() {
                return Self::awaiting(buf, pos, cap);
            }
            if buf[cursor] != b'$' {
                return ParseOutcome::Error(ParseError::UnknownRespType(buf[cursor]));
            }
            let Some(len_crlf) = find_crlf(buf, cursor + 1) else {
                return Self::awaiting(buf, pos, cap);
            };
            let len = match parse_i64(buf, cursor + 1, len_crlf) {
                Ok(n) => n,
                Err(e) => return ParseOutcome::Error(e),
            };
            if len < 0 {
                return ParseOutcome::Error(ParseError::InvalidRespLength(len));
            }
            let body_start = len_crlf + CRLF.len();
            let body_end = body_start + len as usize;
            if buf.len() < body_end + CRLF.len() {
                return Self::awaiting(buf, pos, cap);
            }
            if &buf[body_end..body_end + CRLF.len()] != CRLF {
                return ParseOutcome::Error(ParseError::UnterminatedValue);
            }
            tokens.push(Span::new(body_start, body_end));
            cursor = body_end + CRLF.len();
        }

        let frame = Span::new(pos, cursor);
        let command_name = tokens[0];
        let name_upper = command_name.slice(buf).to_ascii_uppercase();

        match name_upper.as_slice() {
            b"MGET" if tokens.len() > 1 => {
                self.start_fragment_group(RespCommand::Get, command_name, frame, tokens[1..].iter().map(|&k| (k, None)).collect())
            }
            b"DEL" if tokens.len() > 1 => {
                self.start_fragment_group(RespCommand::Del, command_name, frame, tokens[1..].iter().map(|&k| (k, None)).collect())
            }
            b"MSET" if tokens.len() > 3 => {
                if (tokens.len() - 1) % 2 != 0 {
                    return ParseOutcome::Error(ParseError::MissingKey);
                }
                let pairs = tokens[1..].chunks(2).map(|pair| (pair[0], Some(pair[1]))).collect();
                self.start_fragment_group(RespCommand::Set, command_name, frame, pairs)
            }
            b"GET" => {
                let Some(&key) = tokens.get(1) else {
                    return ParseOutcome::Error(ParseError::MissingKey);
                };
                ParseOutcome::Ok {
                    message: request_from(RespCommand::Get, command_name, key, None, frame, true, 1),
                    next_pos: frame.end,
                }
            }
            b"SET" | b"MSET" => {
                let (Some(&key), value) = (tokens.get(1), tokens.get(2).copied()) else {
                    return ParseOutcome::Error(ParseError::MissingKey);
                };
                ParseOutcome::Ok {
                    message: request_from(RespCommand::Set, command_name, key, value, frame, true, 1),
                    next_pos: frame.end,
                }
            }
            b"DEL" => {
                let Some(&key) = tokens.get(1) else {
                    return ParseOutcome::Error(ParseError::MissingKey);
                };
                ParseOutcome::Ok {
                    message: request_from(RespCommand::Del, command_name, key, None, frame, true, 1),
                    next_pos: frame.end,
                }
            }
            _ => {
                let key = tokens.get(1).copied().unwrap_or(command_name);
                ParseOutcome::Ok {
                    message: request_from(RespCommand::Other, command_name, key, None, frame, true, 1),
                    next_pos: frame.end,
                }
            }
        }
    }

    fn start_fragment_group(
        &mut self,
        command: RespCommand,
        command_name: Span,
        frame: Span,
        mut pairs: VecDeque<(Span, Option<Span>)>,
    ) -> ParseOutcome<RespRequest> {
        let frag_count = pairs.len();
        let (key, value) = pairs.pop_front().expect("fragment group is never empty");
        if pairs.is_empty() {
            ParseOutcome::Ok {
                message: request_from(command, command_name, key, value, frame, true, frag_count),
                next_pos: frame.end,
            }
        } else {
            self.state = State::Fragmenting { command, command_name, frame, pairs, frag_count };
            ParseOutcome::Fragment {
                message: request_from(command, command_name, key, value, frame, false, frag_count),
                resume_at: frame.end,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &[u8]) -> ParseOutcome<RespRequest> {
        RespRequestParser::new().parse(input, 0, None)
    }

    fn bulk_array(parts: &[&str]) -> Vec<u8> {
        let mut out = format!("*{}\r\n", parts.len()).into_bytes();
        for p in parts {
            out.extend_from_slice(format!("${}\r\n{p}\r\n", p.len()).as_bytes());
        }
        out
    }

    #[test]
    fn parses_single_get() {
        let buf = bulk_array(&["GET", "foo"]);
        match parse_one(&buf) {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.command, RespCommand::Get);
                assert_eq!(message.key.slice(&buf), b"foo");
                assert!(message.last_fragment);
                assert_eq!(next_pos, buf.len());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn mget_fragments_per_key() {
        let buf = bulk_array(&["MGET", "k1", "k2", "k3"]);
        let mut parser = RespRequestParser::new();
        let ParseOutcome::Fragment { message, .. } = parser.parse(&buf, 0, None) else {
            panic!("expected fragment");
        };
        assert_eq!(message.key.slice(&buf), b"k1");
        assert_eq!(message.frag_count, 3);

        let ParseOutcome::Fragment { message, .. } = parser.parse(&buf, 0, None) else {
            panic!("expected fragment");
        };
        assert_eq!(message.key.slice(&buf), b"k2");

        match parser.parse(&buf, 0, None) {
            ParseOutcome::Ok { message, .. } => {
                assert_eq!(message.key.slice(&buf), b"k3");
                assert!(message.last_fragment);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn mset_fragments_per_pair() {
        let buf = bulk_array(&["MSET", "k1", "v1", "k2", "v2"]);
        let mut parser = RespRequestParser::new();
        let ParseOutcome::Fragment { message, .. } = parser.parse(&buf, 0, None) else {
            panic!("expected fragment");
        };
        assert_eq!(message.key.slice(&buf), b"k1");
        assert_eq!(message.value.unwrap().slice(&buf), b"v1");

        match parser.parse(&buf, 0, None) {
            ParseOutcome::Ok { message, .. } => {
                assert_eq!(message.key.slice(&buf), b"k2");
                assert_eq!(message.value.unwrap().slice(&buf), b"v2");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn single_key_del_does_not_fragment() {
        let buf = bulk_array(&["DEL", "only"]);
        match parse_one(&buf) {
            ParseOutcome::Ok { message, .. } => {
                assert_eq!(message.command, RespCommand::Del);
                assert_eq!(message.frag_count, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn other_commands_pass_through_with_first_arg_as_key() {
        let buf = bulk_array(&["INCR", "counter"]);
        match parse_one(&buf) {
            ParseOutcome::Ok { message, .. } => {
                assert_eq!(message.command, RespCommand::Other);
                assert_eq!(message.key.slice(&buf), b"counter");
                assert_eq!(message.frame.slice(&buf), buf.as_slice());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn incomplete_frame_is_again() {
        let buf = bulk_array(&["GET", "foo"]);
        assert_eq!(parse_one(&buf[..buf.len() - 3]), ParseOutcome::Again);
    }

    #[test]
    fn rejects_non_array_frame() {
        assert!(matches!(
            parse_one(b"+OK\r\n"),
            ParseOutcome::Error(ParseError::UnknownRespType(b'+'))
        ));
    }

    #[test]
    fn splitting_a_request_at_any_byte_yields_the_same_message() {
        let buf = bulk_array(&["GET", "foo"]);
        for split in 0..buf.len() {
            let (head, tail) = buf.split_at(split);
            let mut staged = head.to_vec();
            loop {
                match RespRequestParser::new().parse(&staged, 0, None) {
                    ParseOutcome::Again if staged.len() < buf.len() => {
                        staged.extend_from_slice(tail);
                    }
                    ParseOutcome::Ok { message, .. } => {
                        assert_eq!(message.key.slice(&staged), b"foo");
                        break;
                    }
                    other => panic!("unexpected outcome at split {split}: {other:?}"),
                }
            }
        }
    }
}
