//! Recombines the per-shard responses of a fragmented multi-key request
//! back into the single reply the client expects: memcached strips the
//! non-terminal `END\r\n` of every fragment but the last, and RESP
//! rebuilds the outer array length (`MGET`) or sums the per-fragment
//! integer replies (`DEL`). `MSET`'s fragments all reply `+OK\r\n`;
//! the group collapses to the single reply its last fragment carries.

use crate::message::{Response, ResponseShape};
use crate::protocol::Protocol;

/// Strips a trailing memcached `END\r\n` from everything but the last
/// fragment's wire bytes, so concatenating every fragment's (possibly
/// multi-`VALUE`) body in request order yields one well-formed stream
/// terminated by exactly one `END\r\n`.
fn strip_non_terminal_end(wire: &[u8], is_last: bool) -> Vec<u8> {
    if is_last {
        return wire.to_vec();
    }
    wire.strip_suffix(b"END\r\n").map_or_else(|| wire.to_vec(), <[u8]>::to_vec)
}

/// Combines the `n` sibling fragment responses of one request group,
/// already ordered as the client's original key order (the order the
/// parser assigned them, preserved through routing because each
/// fragment keeps its own `frag_id`-sharing [`crate::message::Msg`]).
#[must_use]
pub fn coalesce(protocol: Protocol, command_name: &[u8], fragments: &[Response]) -> Response {
    match protocol {
        Protocol::Memcache => coalesce_memcache(fragments),
        Protocol::Resp => coalesce_resp(command_name, fragments),
    }
}

fn coalesce_memcache(fragments: &[Response]) -> Response {
    let mut wire = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        let is_last = i + 1 == fragments.len();
        wire.extend_from_slice(&strip_non_terminal_end(&fragment.wire, is_last));
    }
    if !wire.ends_with(b"END\r\n") {
        wire.extend_from_slice(b"END\r\n");
    }
    Response { shape: ResponseShape::Value, key: None, flags: None, value: None, wire, integer: None, stats: Vec::new() }
}

fn coalesce_resp(command_name: &[u8], fragments: &[Response]) -> Response {
    match command_name.to_ascii_uppercase().as_slice() {
        b"DEL" => {
            let total: i64 = fragments.iter().filter_map(|f| f.integer).sum();
            Response {
                shape: ResponseShape::Scalar,
                key: None,
                flags: None,
                value: None,
                wire: format!(":{total}\r\n").into_bytes(),
                integer: Some(total),
                stats: Vec::new(),
            }
        }
        b"MSET" => fragments.last().cloned().unwrap_or(Response {
            shape: ResponseShape::Scalar,
            key: None,
            flags: None,
            value: None,
            wire: b"+OK\r\n".to_vec(),
            integer: None,
            stats: Vec::new(),
        }),
        _ => {
            // MGET: rebuild the outer array from each fragment's single
            // bulk (or nil-bulk) reply, in request order.
            let mut wire = format!("*{}\r\n", fragments.len()).into_bytes();
            for fragment in fragments {
                wire.extend_from_slice(&fragment.wire);
            }
            Response { shape: ResponseShape::Value, key: None, flags: None, value: None, wire, integer: None, stats: Vec::new() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(wire: &[u8]) -> Response {
        Response { shape: ResponseShape::Value, key: None, flags: None, value: None, wire: wire.to_vec(), integer: None, stats: Vec::new() }
    }

    #[test]
    fn memcache_coalesce_strips_non_terminal_end_and_keeps_one_terminator() {
        let fragments = vec![response(b"VALUE k1 0 2\r\n11\r\nVALUE k3 0 2\r\n33\r\nEND\r\n"), response(b"VALUE k2 0 2\r\n22\r\nEND\r\n")];
        let combined = coalesce(Protocol::Memcache, b"get", &fragments);
        assert_eq!(combined.wire, b"VALUE k1 0 2\r\n11\r\nVALUE k3 0 2\r\n33\r\nVALUE k2 0 2\r\n22\r\nEND\r\n");
    }

    #[test]
    fn resp_mget_coalesce_rebuilds_array_header() {
        let fragments = vec![response(b"$2\r\nv1\r\n"), response(b"$-1\r\n")];
        let combined = coalesce(Protocol::Resp, b"MGET", &fragments);
        assert_eq!(combined.wire, b"*2\r\n$2\r\nv1\r\n$-1\r\n");
    }

    #[test]
    fn resp_del_coalesce_sums_integers() {
        let mut a = response(b":1\r\n");
        a.integer = Some(1);
        let mut b = response(b":0\r\n");
        b.integer = Some(0);
        let combined = coalesce(Protocol::Resp, b"DEL", &[a, b]);
        assert_eq!(combined.wire, b":1\r\n");
        assert_eq!(combined.integer, Some(1));
    }

    #[test]
    fn resp_mset_coalesce_returns_single_ok() {
        let fragments = vec![response(b"+OK\r\n"), response(b"+OK\r\n")];
        let combined = coalesce(Protocol::Resp, b"MSET", &fragments);
        assert_eq!(combined.wire, b"+OK\r\n");
    }
}
