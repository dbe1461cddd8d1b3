//! Peer warm-up rewrite: turns a parsed cache-hit `VALUE` response into
//! the `set ... noreply` request that mirrors it back onto a cold
//! primary.

use crate::memcache::message::{MemcacheResponse, MemcacheResponseKind};

/// Builds the wire bytes for `set <key> <flags> 0 <vlen> noreply\r\n<body>\r\n`
/// from a parsed `VALUE` response, streaming the value bytes out of
/// `src` without an intermediate copy of anything but the final
/// request line.
///
/// Returns `None` when `response` is not a `VALUE` (nothing to mirror)
/// or when its `key`/`flags`/`value` spans are missing — a malformed
/// backend response is passed through untouched rather than risking a
/// corrupt warm-up write.
#[must_use]
pub fn build_warmup_request(src: &[u8], response: &MemcacheResponse) -> Option<Vec<u8>> {
    if response.kind != MemcacheResponseKind::Value {
        return None;
    }
    let key = response.key?.slice(src);
    let flags = response.flags?.slice(src);
    let value = response.value?.slice(src);

    let mut out = Vec::with_capacity(key.len() + flags.len() + value.len() + 32);
    out.extend_from_slice(b"set ");
    out.extend_from_slice(key);
    out.push(b' ');
    out.extend_from_slice(flags);
    out.extend_from_slice(b" 0 ");
    out.extend_from_slice(value.len().to_string().as_bytes());
    out.extend_from_slice(b" noreply\r\n");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memcache::request::RequestParser;
    use crate::memcache::response::ResponseParser;
    use crate::outcome::ParseOutcome;

    #[test]
    fn rewrite_reparses_as_a_noreply_set() {
        let src = b"VALUE foo 7 5\r\nhello\r\n";
        let ParseOutcome::Ok { message, .. } = ResponseParser::new().parse(src, 0, None) else {
            panic!("expected Ok");
        };
        let rewritten = build_warmup_request(src, &message).unwrap();
        assert_eq!(rewritten, b"set foo 7 0 5 noreply\r\nhello\r\n");

        let ParseOutcome::Ok { message: req, .. } = RequestParser::new().parse(&rewritten, 0, None) else {
            panic!("rewritten request failed to reparse");
        };
        assert!(req.noreply);
        assert_eq!(req.value.unwrap().slice(&rewritten), b"hello");
    }

    #[test]
    fn non_value_response_yields_no_rewrite() {
        let src = b"STORED\r\n";
        let ParseOutcome::Ok { message, .. } = ResponseParser::new().parse(src, 0, None) else {
            panic!("expected Ok");
        };
        assert!(build_warmup_request(src, &message).is_none());
    }
}
