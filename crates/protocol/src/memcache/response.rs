//! Memcached-ASCII response parser.
//!
//! One call parses one response token. `VALUE` headers complete as soon
//! as their declared value body and trailing CRLF have arrived, but are
//! reported with `terminated = false`: the caller must keep calling the
//! parser until it sees the stream's closing `END` token, exactly as a
//! `get`/`gets` response from a real backend is a run of `VALUE` lines
//! followed by one `END\r\n`. A `STAT` probe response is the other
//! multi-line case, but it loops entirely inside one call: every `STAT`
//! line accumulates into the returned message's `stats` array and the
//! call only completes once the stream's `END\r\n` has also arrived.

use crate::error::ParseError;
use crate::memcache::message::{MemcacheResponse, MemcacheResponseKind};
use crate::outcome::ParseOutcome;
use crate::span::Span;

const CRLF: &[u8] = b"\r\n";

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    memchr::memmem::find(&buf[from..], CRLF).map(|rel| from + rel)
}

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

fn parse_usize(buf: &[u8], span: Span) -> Result<usize, ParseError> {
    std::str::from_utf8(span.slice(buf))
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ParseError::MalformedNumber)
}

fn empty_response(kind: MemcacheResponseKind) -> MemcacheResponse {
    MemcacheResponse {
        kind,
        key: None,
        flags: None,
        vlen: None,
        value: None,
        text: None,
        stats: Vec::new(),
        terminated: true,
    }
}

/// Resumable memcached-ASCII response parser.
#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    state: State,
}

#[derive(Debug, Clone, Default)]
enum State {
    #[default]
    Fresh,
    /// A `VALUE` header line has been parsed; waiting for `vlen` body
    /// bytes plus the trailing CRLF.
    AwaitingValue {
        key: Span,
        flags: Span,
        vlen: usize,
        val_start: usize,
    },
    /// Mid a `STAT` stream; `stats` accumulates spans from prior lines
    /// across however many `Again` resumptions this call needed.
    AwaitingStat { stats: Vec<(Span, Span)> },
}

impl ResponseParser {
    /// Creates a parser starting in its initial `Fresh` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one response token starting at `pos`.
    pub fn parse(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<MemcacheResponse> {
        match self.state.clone() {
            State::Fresh => self.parse_fresh(buf, pos, cap),
            State::AwaitingValue { key, flags, vlen, val_start } => {
                self.parse_value_body(buf, key, flags, vlen, val_start, cap)
            }
            State::AwaitingStat { stats } => self.parse_stat_loop(buf, pos, cap, stats),
        }
    }

    fn awaiting(buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<MemcacheResponse> {
        match cap {
            Some(cap) if buf.len() >= cap => ParseOutcome::Repair { token_start: pos },
            _ => ParseOutcome::Again,
        }
    }

    fn parse_fresh(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<MemcacheResponse> {
        let Some(crlf) = find_crlf(buf, pos) else {
            return Self::awaiting(buf, pos, cap);
        };
        let line_end = crlf + CRLF.len();
        let tokens = tokenize(buf, pos, crlf);
        let Some(&head) = tokens.first() else {
            return ParseOutcome::Error(ParseError::UnknownCommand(String::new()));
        };

        match head.slice(buf) {
            b"END" => ParseOutcome::Ok { message: empty_response(MemcacheResponseKind::End), next_pos: line_end },
            b"STORED" => {
                ParseOutcome::Ok { message: empty_response(MemcacheResponseKind::Stored), next_pos: line_end }
            }
            b"EXISTS" => {
                ParseOutcome::Ok { message: empty_response(MemcacheResponseKind::Exists), next_pos: line_end }
            }
            b"DELETED" => {
                ParseOutcome::Ok { message: empty_response(MemcacheResponseKind::Deleted), next_pos: line_end }
            }
            b"NOT_FOUND" => {
                ParseOutcome::Ok { message: empty_response(MemcacheResponseKind::NotFound), next_pos: line_end }
            }
            b"NOT_STORED" => {
                ParseOutcome::Ok { message: empty_response(MemcacheResponseKind::NotStored), next_pos: line_end }
            }
            b"ERROR" => {
                ParseOutcome::Ok { message: empty_response(MemcacheResponseKind::Error), next_pos: line_end }
            }
            b"CLIENT_ERROR" => ParseOutcome::Ok {
                message: MemcacheResponse {
                    text: Some(Span::new(tokens.get(1).map_or(crlf, |t| t.start), crlf)),
                    ..empty_response(MemcacheResponseKind::ClientError)
                },
                next_pos: line_end,
            },
            b"SERVER_ERROR" => ParseOutcome::Ok {
                message: MemcacheResponse {
                    text: Some(Span::new(tokens.get(1).map_or(crlf, |t| t.start), crlf)),
                    ..empty_response(MemcacheResponseKind::ServerError)
                },
                next_pos: line_end,
            },
            b"VALUE" => self.parse_value_header(buf, &tokens, line_end, cap),
            b"STAT" => self.parse_stat_loop(buf, pos, cap, Vec::new()),
            other => ParseOutcome::Error(ParseError::UnknownCommand(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    fn parse_value_header(
        &mut self,
        buf: &[u8],
        tokens: &[Span],
        line_end: usize,
        cap: Option<usize>,
    ) -> ParseOutcome<MemcacheResponse> {
        let (Some(&key), Some(&flags), Some(&vlen_tok)) = (tokens.get(1), tokens.get(2), tokens.get(3)) else {
            return ParseOutcome::Error(ParseError::MissingKey);
        };
        let vlen = match parse_usize(buf, vlen_tok) {
            Ok(v) => v,
            Err(e) => return ParseOutcome::Error(e),
        };
        self.parse_value_body(buf, key, flags, vlen, line_end, cap)
    }

    fn parse_value_body(
        &mut self,
        buf: &[u8],
        key: Span,
        flags: Span,
        vlen: usize,
        val_start: usize,
        cap: Option<usize>,
    ) -> ParseOutcome<MemcacheResponse> {
        let val_end = val_start + vlen;
        if buf.len() < val_end + CRLF.len() {
            self.state = State::AwaitingValue { key, flags, vlen, val_start };
            return Self::awaiting(buf, val_start, cap);
        }
        if &buf[val_end..val_end + CRLF.len()] != CRLF {
            return ParseOutcome::Error(ParseError::UnterminatedValue);
        }
        self.state = State::Fresh;
        ParseOutcome::Ok {
            message: MemcacheResponse {
                kind: MemcacheResponseKind::Value,
                key: Some(key),
                flags: Some(flags),
                vlen: Some(vlen),
                value: Some(Span::new(val_start, val_end)),
                text: None,
                stats: Vec::new(),
                terminated: false,
            },
            next_pos: val_end + CRLF.len(),
        }
    }

    fn parse_stat_loop(
        &mut self,
        buf: &[u8],
        pos: usize,
        cap: Option<usize>,
        mut stats: Vec<(Span, Span)>,
    ) -> ParseOutcome<MemcacheResponse> {
        let mut cursor = pos;
        loop {
            let Some(crlf) = find_crlf(buf, cursor) else {
                self.state = State::AwaitingStat { stats };
                return Self::awaiting(buf, cursor, cap);
            };
            let line_end = crlf + CRLF.len();
            let tokens = tokenize(buf, cursor, crlf);
            let Some(&head) = tokens.first() else {
                return ParseOutcome::Error(ParseError::UnknownCommand(String::new()));
            };
            match head.slice(buf) {
                b"END" => {
                    self.state = State::Fresh;
                    return ParseOutcome::Ok {
                        message: MemcacheResponse {
                            stats,
                            ..empty_response(MemcacheResponseKind::Stat)
                        },
                        next_pos: line_end,
                    };
                }
                b"STAT" => {
                    let (Some(&k), Some(&v)) = (tokens.get(1), tokens.get(2)) else {
                        return ParseOutcome::Error(ParseError::MissingKey);
                    };
                    stats.push((k, v));
                    cursor = line_end;
                }
                other => {
                    return ParseOutcome::Error(ParseError::UnknownCommand(
                        String::from_utf8_lossy(other).into_owned(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &[u8]) -> ParseOutcome<MemcacheResponse> {
        ResponseParser::new().parse(input, 0, None)
    }

    #[test]
    fn parses_stored() {
        let outcome = parse_one(b"STORED\r\n");
        match outcome {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.kind, MemcacheResponseKind::Stored);
                assert_eq!(next_pos, 8);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn parses_value_as_unterminated() {
        let buf = b"VALUE foo 0 2\r\nhi\r\n";
        let outcome = parse_one(buf);
        match outcome {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.kind, MemcacheResponseKind::Value);
                assert_eq!(message.key.unwrap().slice(buf), b"foo");
                assert_eq!(message.value.unwrap().slice(buf), b"hi");
                assert!(!message.terminated);
                assert_eq!(next_pos, buf.len());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn value_waits_for_full_body() {
        let buf = b"VALUE foo 0 5\r\nhel";
        assert_eq!(parse_one(buf), ParseOutcome::Again);
    }

    #[test]
    fn parses_end_terminator() {
        let outcome = parse_one(b"END\r\n");
        match outcome {
            ParseOutcome::Ok { message, .. } => assert_eq!(message.kind, MemcacheResponseKind::End),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn stat_stream_accumulates_until_end() {
        let buf = b"STAT uptime 100\r\nSTAT cmd_get 5\r\nEND\r\n";
        let outcome = parse_one(buf);
        match outcome {
            ParseOutcome::Ok { message, next_pos } => {
                assert_eq!(message.kind, MemcacheResponseKind::Stat);
                assert_eq!(message.stats.len(), 2);
                assert_eq!(message.stats[0].0.slice(buf), b"uptime");
                assert_eq!(message.stats[0].1.slice(buf), b"100");
                assert_eq!(message.stats[1].0.slice(buf), b"cmd_get");
                assert_eq!(next_pos, buf.len());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn stat_stream_resumes_across_partial_reads() {
        let buf = b"STAT uptime 100\r\nSTAT cmd_get 5\r\nEND\r\n";
        let mut parser = ResponseParser::new();
        assert_eq!(parser.parse(&buf[..20], 0, None), ParseOutcome::Again);
        match parser.parse(buf, 0, None) {
            ParseOutcome::Ok { message, .. } => assert_eq!(message.stats.len(), 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn client_error_captures_text() {
        let buf = b"CLIENT_ERROR bad command line format\r\n";
        let outcome = parse_one(buf);
        match outcome {
            ParseOutcome::Ok { message, .. } => {
                assert_eq!(message.kind, MemcacheResponseKind::ClientError);
                assert_eq!(message.text.unwrap().slice(buf), b"bad command line format");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_token() {
        assert!(matches!(
            parse_one(b"WAT\r\n"),
            ParseOutcome::Error(ParseError::UnknownCommand(_))
        ));
    }
}
