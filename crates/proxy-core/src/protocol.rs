//! Protocol dispatch for the two wire formats the proxy speaks.
//!
//! The source picks `recv`/`send`/`routing`/`pre_coalesce`/... via a
//! function-pointer vtable resolved once at connection construction.
//! Two implementations (memcached, RESP) over three connection roles is
//! a closed, small set, so this crate follows the same enum-dispatch
//! idiom [`distributor::Distributor`] already uses for its own four
//! variants rather than reaching for `dyn Trait`: a `match` on
//! [`Protocol`] is resolved once per connection and every call site
//! after that is a direct, non-virtual function call.

use protocol::memcache::{self, MemcacheOpcode, MemcacheResponseKind};
use protocol::resp::{self, RespCommand, RespResponseKind};
use protocol::{ParseError, ParseOutcome};

use crate::message::{Command, Request, Response, ResponseShape};

/// Which wire protocol a pool's connections speak, set once from
/// `PoolConfig::redis` at pool-build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Memcached ASCII.
    Memcache,
    /// Redis RESP.
    Resp,
}

impl Protocol {
    /// Resolves from the configuration's `redis` flag.
    #[must_use]
    pub fn from_redis_flag(redis: bool) -> Self {
        if redis {
            Self::Resp
        } else {
            Self::Memcache
        }
    }

    /// Builds a fresh request parser for this protocol.
    #[must_use]
    pub fn request_parser(self) -> RequestParser {
        match self {
            Self::Memcache => RequestParser::Memcache(memcache::RequestParser::new()),
            Self::Resp => RequestParser::Resp(resp::RespRequestParser::new()),
        }
    }

    /// Builds a fresh response parser for this protocol.
    #[must_use]
    pub fn response_parser(self) -> ResponseParser {
        match self {
            Self::Memcache => ResponseParser::Memcache(memcache::ResponseParser::new()),
            Self::Resp => ResponseParser::Resp(resp::RespResponseParser::new()),
        }
    }

    /// The active-probe request bytes sent to a server whose
    /// `next_probe` has come due: `stats\r\n` for memcached, `PING\r\n`
    /// for RESP.
    #[must_use]
    pub fn probe_request(self) -> &'static [u8] {
        match self {
            Self::Memcache => b"stats\r\n",
            Self::Resp => b"*1\r\n$4\r\nPING\r\n",
        }
    }

    /// Builds the wire bytes of a protocol error reply for a malformed
    /// client request.
    #[must_use]
    pub fn error_reply(self, error: &ParseError) -> Vec<u8> {
        match self {
            Self::Memcache => format!("CLIENT_ERROR {error}\r\n").into_bytes(),
            Self::Resp => format!("-ERR {error}\r\n").into_bytes(),
        }
    }

    /// Builds the wire bytes of a "no server available" reply.
    #[must_use]
    pub fn service_unavailable_reply(self) -> Vec<u8> {
        match self {
            Self::Memcache => b"SERVER_ERROR no server available\r\n".to_vec(),
            Self::Resp => b"-ERR no server available\r\n".to_vec(),
        }
    }

    /// Builds the wire bytes of a rate-limit rejection.
    #[must_use]
    pub fn too_many_requests_reply(self) -> Vec<u8> {
        match self {
            Self::Memcache => b"SERVER_ERROR too many requests\r\n".to_vec(),
            Self::Resp => b"-ERR too many requests\r\n".to_vec(),
        }
    }
}

/// Resumable request parser, uniform across both protocols.
pub enum RequestParser {
    /// Memcached ASCII.
    Memcache(memcache::RequestParser),
    /// Redis RESP.
    Resp(resp::RespRequestParser),
}

impl RequestParser {
    /// Parses one request (or fragment) starting at `pos`, translating
    /// the protocol-specific result into the unified [`Request`].
    pub fn parse(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<Request> {
        match self {
            Self::Memcache(parser) => match parser.parse(buf, pos, cap) {
                ParseOutcome::Ok { message, next_pos } => ParseOutcome::Ok {
                    message: memcache_request_to_unified(buf, &message),
                    next_pos,
                },
                ParseOutcome::Fragment { message, resume_at } => ParseOutcome::Fragment {
                    message: memcache_request_to_unified(buf, &message),
                    resume_at,
                },
                ParseOutcome::Again => ParseOutcome::Again,
                ParseOutcome::Repair { token_start } => ParseOutcome::Repair { token_start },
                ParseOutcome::Error(e) => ParseOutcome::Error(e),
            },
            Self::Resp(parser) => match parser.parse(buf, pos, cap) {
                ParseOutcome::Ok { message, next_pos } => ParseOutcome::Ok {
                    message: resp_request_to_unified(buf, &message),
                    next_pos,
                },
                ParseOutcome::Fragment { message, resume_at } => ParseOutcome::Fragment {
                    message: resp_request_to_unified(buf, &message),
                    resume_at,
                },
                ParseOutcome::Again => ParseOutcome::Again,
                ParseOutcome::Repair { token_start } => ParseOutcome::Repair { token_start },
                ParseOutcome::Error(e) => ParseOutcome::Error(e),
            },
        }
    }
}

/// Resumable response parser, uniform across both protocols.
pub enum ResponseParser {
    /// Memcached ASCII.
    Memcache(memcache::ResponseParser),
    /// Redis RESP.
    Resp(resp::RespResponseParser),
}

impl ResponseParser {
    /// Parses one response (or fragment) starting at `pos`.
    pub fn parse(&mut self, buf: &[u8], pos: usize, cap: Option<usize>) -> ParseOutcome<Response> {
        match self {
            Self::Memcache(parser) => match parser.parse(buf, pos, cap) {
                ParseOutcome::Ok { message, next_pos } => {
                    ParseOutcome::Ok { message: memcache_response_to_unified(buf, &message), next_pos }
                }
                ParseOutcome::Again => ParseOutcome::Again,
                ParseOutcome::Repair { token_start } => ParseOutcome::Repair { token_start },
                ParseOutcome::Error(e) => ParseOutcome::Error(e),
                ParseOutcome::Fragment { .. } => {
                    unreachable!("memcached responses never fragment")
                }
            },
            Self::Resp(parser) => match parser.parse(buf, pos, cap) {
                ParseOutcome::Ok { message, next_pos } => {
                    ParseOutcome::Ok { message: resp_response_to_unified(buf, &message), next_pos }
                }
                ParseOutcome::Again => ParseOutcome::Again,
                ParseOutcome::Repair { token_start } => ParseOutcome::Repair { token_start },
                ParseOutcome::Error(e) => ParseOutcome::Error(e),
                ParseOutcome::Fragment { .. } => unreachable!("RESP responses never fragment"),
            },
        }
    }
}

fn memcache_request_to_unified(buf: &[u8], message: &memcache::MemcacheRequest) -> Request {
    let command = match message.opcode {
        MemcacheOpcode::Get | MemcacheOpcode::Gets => Command::Get,
        MemcacheOpcode::Set
        | MemcacheOpcode::Add
        | MemcacheOpcode::Cas
        | MemcacheOpcode::Replace
        | MemcacheOpcode::Append
        | MemcacheOpcode::Prepend => Command::Set,
        MemcacheOpcode::Delete => Command::Delete,
        MemcacheOpcode::Incr | MemcacheOpcode::Decr | MemcacheOpcode::Quit => Command::Other,
    };
    let key = message.key.slice(buf).to_vec();
    let value = message.value.map(|v| v.slice(buf).to_vec());
    let wire = rebuild_memcache_wire(buf, message, &key);
    Request {
        command,
        key,
        value,
        wire,
        noreply: message.noreply,
        quit: message.opcode == MemcacheOpcode::Quit,
        last_fragment: message.last_fragment,
    }
}

/// Multi-key `get`/`gets` fragments carry only a key span, not the
/// original command line (the client's one `get k1 k2 k3\r\n` is shared
/// across fragments) — re-synthesise a single-key command line so each
/// fragment forwards as its own independent backend request.
fn rebuild_memcache_wire(buf: &[u8], message: &memcache::MemcacheRequest, key: &[u8]) -> Vec<u8> {
    match message.opcode {
        MemcacheOpcode::Get => format!("get {}\r\n", String::from_utf8_lossy(key)).into_bytes(),
        MemcacheOpcode::Gets => format!("gets {}\r\n", String::from_utf8_lossy(key)).into_bytes(),
        MemcacheOpcode::Delete => {
            let suffix = if message.noreply { " noreply" } else { "" };
            format!("delete {}{suffix}\r\n", String::from_utf8_lossy(key)).into_bytes()
        }
        MemcacheOpcode::Set
        | MemcacheOpcode::Add
        | MemcacheOpcode::Cas
        | MemcacheOpcode::Replace
        | MemcacheOpcode::Append
        | MemcacheOpcode::Prepend => {
            let opcode_name = match message.opcode {
                MemcacheOpcode::Set => "set",
                MemcacheOpcode::Add => "add",
                MemcacheOpcode::Cas => "cas",
                MemcacheOpcode::Replace => "replace",
                MemcacheOpcode::Append => "append",
                MemcacheOpcode::Prepend => "prepend",
                _ => unreachable!(),
            };
            let value = message.value.map(|v| v.slice(buf)).unwrap_or_default();
            let mut out = format!(
                "{opcode_name} {} {} {} {}",
                String::from_utf8_lossy(key),
                message.flags.unwrap_or(0),
                message.exptime.unwrap_or(0),
                value.len(),
            );
            if let Some(cas) = message.cas {
                out.push(' ');
                out.push_str(&cas.to_string());
            }
            if message.noreply {
                out.push_str(" noreply");
            }
            out.push_str("\r\n");
            let mut out = out.into_bytes();
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
            out
        }
        MemcacheOpcode::Incr | MemcacheOpcode::Decr => {
            let opcode_name = if message.opcode == MemcacheOpcode::Incr { "incr" } else { "decr" };
            let suffix = if message.noreply { " noreply" } else { "" };
            format!(
                "{opcode_name} {} {}{suffix}\r\n",
                String::from_utf8_lossy(key),
                message.delta.unwrap_or(0)
            )
            .into_bytes()
        }
        MemcacheOpcode::Quit => b"quit\r\n".to_vec(),
    }
}

fn memcache_response_to_unified(buf: &[u8], message: &memcache::MemcacheResponse) -> Response {
    let shape = match message.kind {
        MemcacheResponseKind::Value => ResponseShape::Value,
        MemcacheResponseKind::End | MemcacheResponseKind::NotFound => ResponseShape::Miss,
        MemcacheResponseKind::Error | MemcacheResponseKind::ClientError | MemcacheResponseKind::ServerError => {
            ResponseShape::Error
        }
        MemcacheResponseKind::Stat
        | MemcacheResponseKind::Stored
        | MemcacheResponseKind::Exists
        | MemcacheResponseKind::Deleted
        | MemcacheResponseKind::NotStored => ResponseShape::Scalar,
    };
    let key = message.key.map(|k| k.slice(buf).to_vec());
    let flags = message
        .flags
        .and_then(|f| std::str::from_utf8(f.slice(buf)).ok())
        .and_then(|s| s.parse().ok());
    let value = message.value.map(|v| v.slice(buf).to_vec());
    let wire = rebuild_memcache_response_wire(message, key.as_deref(), flags, value.as_deref());
    let stats = message.stats.iter().map(|&(k, v)| (k.slice(buf).to_vec(), v.slice(buf).to_vec())).collect();
    Response { shape, key, flags, value, wire, integer: None, stats }
}

fn rebuild_memcache_response_wire(
    message: &memcache::MemcacheResponse,
    key: Option<&[u8]>,
    flags: Option<u32>,
    value: Option<&[u8]>,
) -> Vec<u8> {
    match message.kind {
        MemcacheResponseKind::Value => {
            let key = key.unwrap_or_default();
            let value = value.unwrap_or_default();
            let mut out =
                format!("VALUE {} {} {}\r\n", String::from_utf8_lossy(key), flags.unwrap_or(0), value.len())
                    .into_bytes();
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
            out
        }
        MemcacheResponseKind::End => b"END\r\n".to_vec(),
        MemcacheResponseKind::Stored => b"STORED\r\n".to_vec(),
        MemcacheResponseKind::Exists => b"EXISTS\r\n".to_vec(),
        MemcacheResponseKind::Deleted => b"DELETED\r\n".to_vec(),
        MemcacheResponseKind::NotFound => b"NOT_FOUND\r\n".to_vec(),
        MemcacheResponseKind::NotStored => b"NOT_STORED\r\n".to_vec(),
        MemcacheResponseKind::Error => b"ERROR\r\n".to_vec(),
        MemcacheResponseKind::ClientError => b"CLIENT_ERROR\r\n".to_vec(),
        MemcacheResponseKind::ServerError => b"SERVER_ERROR\r\n".to_vec(),
        MemcacheResponseKind::Stat => b"END\r\n".to_vec(),
    }
}

fn resp_request_to_unified(buf: &[u8], message: &resp::RespRequest) -> Request {
    let command = match message.command {
        RespCommand::Get => Command::Get,
        RespCommand::Set => Command::Set,
        RespCommand::Del => Command::Delete,
        RespCommand::Other => Command::Other,
    };
    let key = message.key.slice(buf).to_vec();
    let value = message.value.map(|v| v.slice(buf).to_vec());
    let wire = if message.frag_count > 1 {
        rebuild_resp_wire(&message.command_name.slice(buf).to_ascii_uppercase(), &key, value.as_deref())
    } else {
        message.frame.slice(buf).to_vec()
    };
    Request { command, key, value, wire, noreply: false, quit: false, last_fragment: message.last_fragment }
}

fn rebuild_resp_wire(command_name: &[u8], key: &[u8], value: Option<&[u8]>) -> Vec<u8> {
    let name = match command_name {
        b"MGET" => b"GET".as_slice(),
        b"MSET" => b"SET".as_slice(),
        other => other,
    };
    let mut parts: Vec<&[u8]> = vec![name, key];
    if let Some(value) = value {
        parts.push(value);
    }
    let mut out = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        out.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        out.extend_from_slice(part);
        out.extend_from_slice(b"\r\n");
    }
    out
}

fn resp_response_to_unified(buf: &[u8], message: &resp::RespResponse) -> Response {
    let shape = match message.kind {
        RespResponseKind::Bulk if message.nil => ResponseShape::Miss,
        RespResponseKind::Bulk => ResponseShape::Value,
        RespResponseKind::Array if message.nil => ResponseShape::Miss,
        RespResponseKind::Array => ResponseShape::Value,
        RespResponseKind::Error => ResponseShape::Error,
        RespResponseKind::SimpleString | RespResponseKind::Integer => ResponseShape::Scalar,
    };
    let value = (!message.nil).then(|| message.payload.map(|p| p.slice(buf).to_vec())).flatten();
    let wire = message.frame.slice(buf).to_vec();
    Response { shape, key: None, flags: None, value, wire, integer: message.integer, stats: Vec::new() }
}

/// Rewrites a memcached `VALUE` response (already unified) into the
/// `set <key> <flags> 0 <vlen> noreply\r\n<body>\r\n` request used to
/// mirror a cache hit back onto a cold primary during warm-up. Mirrors
/// [`protocol::memcache::build_warmup_request`] but operates on the
/// owned [`Response`] this layer works with instead of spans into a
/// live read buffer.
#[must_use]
pub fn build_warmup_wire(key: &[u8], flags: u32, value: &[u8]) -> Vec<u8> {
    let mut out = format!("set {} {flags} 0 {} noreply\r\n", String::from_utf8_lossy(key), value.len()).into_bytes();
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memcache_get_fragment_rebuilds_single_key_wire() {
        let mut parser = Protocol::Memcache.request_parser();
        let buf = b"get k1 k2\r\n";
        let ParseOutcome::Fragment { message, .. } = parser.parse(buf, 0, None) else {
            panic!("expected fragment");
        };
        assert_eq!(message.wire, b"get k1\r\n");
        assert_eq!(message.command, Command::Get);
    }

    #[test]
    fn resp_mget_fragment_rebuilds_as_get() {
        let mut parser = Protocol::Resp.request_parser();
        let buf = b"*3\r\n$4\r\nMGET\r\n$2\r\nk1\r\n$2\r\nk2\r\n";
        let ParseOutcome::Fragment { message, .. } = parser.parse(buf, 0, None) else {
            panic!("expected fragment");
        };
        assert_eq!(message.wire, b"*2\r\n$3\r\nGET\r\n$2\r\nk1\r\n");
    }

    #[test]
    fn memcache_value_response_unifies_with_owned_fields() {
        let mut parser = Protocol::Memcache.response_parser();
        let buf = b"VALUE foo 7 5\r\nhello\r\n";
        let ParseOutcome::Ok { message, .. } = parser.parse(buf, 0, None) else {
            panic!("expected ok");
        };
        assert_eq!(message.shape, ResponseShape::Value);
        assert_eq!(message.key.as_deref(), Some(b"foo".as_slice()));
        assert_eq!(message.flags, Some(7));
        assert_eq!(message.value.as_deref(), Some(b"hello".as_slice()));
    }

    #[test]
    fn warmup_wire_matches_protocol_crate_rewrite_shape() {
        let wire = build_warmup_wire(b"foo", 7, b"hello");
        assert_eq!(wire, b"set foo 7 0 5 noreply\r\nhello\r\n");
    }

    #[test]
    fn memcache_stat_response_unifies_with_owned_key_value_pairs() {
        let mut parser = Protocol::Memcache.response_parser();
        let buf = b"STAT uptime 100\r\nSTAT cold 1\r\nEND\r\n";
        let ParseOutcome::Ok { message, .. } = parser.parse(buf, 0, None) else {
            panic!("expected ok");
        };
        assert_eq!(message.shape, ResponseShape::Scalar);
        assert_eq!(
            message.stats,
            vec![(b"uptime".to_vec(), b"100".to_vec()), (b"cold".to_vec(), b"1".to_vec())]
        );
    }
}
