//! RESP response parser.

use crate::error::ParseError;
use crate::outcome::ParseOutcome;
use crate::resp::message::{RespResponse, RespResponseKind};
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

/// Resumable RESP response parser. Stateless between calls: every call
/// re-scans from `pos`, which is cheap since a response frame is
/// bounded and the parser never partially consumes one.
#[derive(Debug, Clone, Default)]
pub struct RespResponseParser;

impl RespResponseParser {
    /// Creates a new parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parses one response frame starting at `pos`.
    pub fn parse(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<RespResponse> {
        Self::parse_value(buf, pos, cap, true)
    }

    /// Parses one RESP value. `top_level` controls whether an array
    /// element is itself allowed to be an array (the proxy never needs
    /// more than one level of nesting for response reassembly).
    fn parse_value(buf: &[u8], pos: usize, cap: Option<usize>, top_level: bool) -> ParseOutcome<RespResponse> {
        if pos >= buf.len() {
            return Self::awaiting(buf, pos, cap);
        }
        let tag = buf[pos];
        let Some(crlf) = find_crlf(buf, pos + 1) else {
            return Self::awaiting(buf, pos, cap);
        };
        let line_end = crlf + CRLF.len();

        match tag {
            b'+' => ParseOutcome::Ok {
                message: scalar(RespResponseKind::SimpleString, Span::new(pos + 1, crlf), Span::new(pos, line_end)),
                next_pos: line_end,
            },
            b'-' => ParseOutcome::Ok {
                message: scalar(RespResponseKind::Error, Span::new(pos + 1, crlf), Span::new(pos, line_end)),
                next_pos: line_end,
            },
            b':' => {
                let n = match parse_i64(buf, pos + 1, crlf) {
                    Ok(n) => n,
                    Err(e) => return ParseOutcome::Error(e),
                };
                ParseOutcome::Ok {
                    message: RespResponse {
                        kind: RespResponseKind::Integer,
                        nil: false,
                        integer: Some(n),
                        payload: None,
                        elements: Vec::new(),
                        frame: Span::new(pos, line_end),
                    },
                    next_pos: line_end,
                }
            }
            b'$' => {
                let len = match parse_i64(buf, pos + 1, crlf) {
                    Ok(n) => n,
                    Err(e) => return ParseOutcome::Error(e),
                };
                if len < 0 {
                    return ParseOutcome::Ok {
                        message: RespResponse {
                            kind: RespResponseKind::Bulk,
                            nil: true,
                            integer: None,
                            payload: None,
                            elements: Vec::new(),
                            frame: Span::new(pos, line_end),
                        },
                        next_pos: line_end,
                    };
                }
                let body_start = line_end;
                let body_end = body_start + len as usize;
                if buf.len() < body_end + CRLF.len() {
                    return Self::awaiting(buf, pos, cap);
                }
                if &buf[body_end..body_end + CRLF.len()] != CRLF {
                    return ParseOutcome::Error(ParseError::UnterminatedValue);
                }
                ParseOutcome::Ok {
                    message: RespResponse {
                        kind: RespResponseKind::Bulk,
                        nil: false,
                        integer: None,
                        payload: Some(Span::new(body_start, body_end)),
                        elements: Vec::new(),
                        frame: Span::new(pos, body_end + CRLF.len()),
                    },
                    next_pos: body_end + CRLF.len(),
                }
            }
            b'*' => {
                let n = match parse_i64(buf, pos + 1, crlf) {
                    Ok(n) => n,
                    Err(e) => return ParseOutcome::Error(e),
                };
                if !top_level {
                    return ParseOutcome::Error(ParseError::InvalidRespLength(n));
                }
                if n < 0 {
                    return ParseOutcome::Ok {
                        message: RespResponse {
                            kind: RespResponseKind::Array,
                            nil: true,
                            integer: None,
                            payload: None,
                            elements: Vec::new(),
                            frame: Span::new(pos, line_end),
                        },
                        next_pos: line_end,
                    };
                }
                let mut cursor = line_end;
                let mut elements = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    match Self::parse_value(buf, cursor, cap, false) {
                        ParseOutcome::Ok { message, next_pos } => {
                            elements.push(if message.nil { None } else { message.payload });
                            cursor = next_pos;
                        }
                        other => return other,
                    }
                }
                ParseOutcome::Ok {
                    message: RespResponse {
                        kind: RespResponseKind::Array,
                        nil: false,
                        integer: None,
                        payload: None,
                        elements,
                        frame: Span::new(pos, cursor),
                    },
                    next_pos: cursor,
                }
            }
            other => ParseOutcome::Error(ParseError::UnknownRespType(other)),
        }
    }

    fn awaiting(buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<RespResponse> {
        match cap {
            Some(cap) if buf.len() >= cap => ParseOutcome::Repair { token_start: pos },
            _ => ParseOutcome::Again,
        }
    }
}

fn scalar(kind: RespResponseKind, payload: Span, frame: Span) -> RespResponse {
    RespResponse { kind, nil: false, integer: None, payload: Some(payload), elements: Vec::new(), frame }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &[u8]) -> ParseOutcome<RespResponse> {
        RespResponseParser::new().parse(input, 0, None)
    }

    #[test]
    fn parses_simple_string() {
        match parse_one(b"+OK\r\n") {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.kind, RespResponseKind::SimpleString);
                assert_eq!(message.payload.unwrap().slice(b"+OK\r\n"), b"OK");
                assert_eq!(next_pos, 5);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn parses_integer() {
        match parse_one(b":42\r\n") {
            ParseOutcome::Ok { message, .. } => {
                assert_eq!(message.kind, RespResponseKind::Integer);
                assert_eq!(message.integer, Some(42));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn parses_bulk_string() {
        let buf = b"$5\r\nhello\r\n";
        match parse_one(buf) {
            ParseOutcome::Ok { message, next_pos } => {
                assert!(!message.nil);
                assert_eq!(message.payload.unwrap().slice(buf), b"hello");
                assert_eq!(next_pos, buf.len());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn parses_nil_bulk_string() {
        match parse_one(b"$-1\r\n") {
            ParseOutcome::Ok { message, .. } => assert!(message.nil),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn parses_array_with_nil_element() {
        let buf = b"*2\r\n$1\r\na\r\n$-1\r\n";
        match parse_one(buf) {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.kind, RespResponseKind::Array);
                assert_eq!(message.elements.len(), 2);
                assert_eq!(message.elements[0].unwrap().slice(buf), b"a");
                assert!(message.elements[1].is_none());
                assert_eq!(next_pos, buf.len());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn parses_error_reply() {
        match parse_one(b"-ERR bad\r\n") {
            ParseOutcome::Ok { message, .. } => {
                assert_eq!(message.kind, RespResponseKind::Error);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn incomplete_bulk_is_again() {
        assert_eq!(parse_one(b"$5\r\nhel"), ParseOutcome::Again);
    }

    #[test]
    fn rejects_unknown_tag() {
        assert!(matches!(
            parse_one(b"?\r\n"),
            ParseOutcome::Error(ParseError::UnknownRespType(b'?'))
        ));
    }
}
