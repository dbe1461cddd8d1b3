//! The reactor-agnostic orchestration core: routes parsed requests to a
//! server connection, pairs FIFO responses back to their request,
//! coalesces fragment groups, and runs the pool-lifecycle ticks (rate-
//! limiter refill, active probe, timeout sweep). Everything here is
//! synchronous and non-blocking; `server` drives it from readiness
//! events on a `tokio::net::TcpStream`-backed [`crate::conn::Transport`].
//!
//! One simplification from the source: there, a server connection's
//! `imsg_q`/`omsg_q` split tracks the exact byte offset at which a
//! request has been fully *written*, independent of when its bytes
//! were merely *queued*. Here, [`Conn::write_buf`] already buffers and
//! drains arbitrary byte ranges across ticks, so a request moves
//! straight to `omsg_q` (awaiting its response) as soon as its wire
//! bytes are queued — the FIFO pairing invariant only needs enqueue
//! order preserved, not a separate in-flight/sent distinction.

use std::collections::HashMap;
use std::io;

use pool::RateLimiter;
use protocol::ParseOutcome;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::arena::{Arena, Handle};
use crate::conn::{Conn, Role, Transport};
use crate::error::ProxyError;
use crate::fragment;
use crate::message::{Command, Msg, Request, Response, ResponseShape};
use crate::protocol::Protocol;

/// Per-pool metadata the engine needs that isn't carried on
/// [`pool::Pool`] itself.
#[derive(Debug, Clone)]
pub struct PoolRuntime {
    /// Which wire protocol this pool's connections speak.
    pub protocol: Protocol,
    /// Request timeout in milliseconds; `0` disables the timeout wheel
    /// for this pool's requests.
    pub timeout_ms: u64,
    /// Two-byte hash-tag delimiters (e.g. `{`, `}`), if configured.
    pub hash_tag: Option<(u8, u8)>,
    /// The pool `LPUSH`-notified on every `delete`, if configured.
    pub message_queue: Option<String>,
    /// Whether this is a virtual (namespace-routing, no own servers)
    /// pool rather than a concrete one.
    pub is_virtual: bool,
}

/// Opens the backend connection a pool's server needs, kept separate
/// from [`Engine`] so the orchestration core stays transport-agnostic;
/// `server` implements this over real TCP connects.
pub trait Connector {
    /// Opens a new connection to `pool_name`'s server at `server_index`.
    fn connect(&mut self, pool_name: &str, server_index: usize) -> io::Result<Box<dyn Transport>>;
}

struct FragmentGroup {
    protocol: Protocol,
    command: Command,
    members: Vec<Handle<Msg>>,
    closed: bool,
    errored: bool,
}

/// The routing, pairing, and lifecycle core.
pub struct Engine {
    msgs: Arena<Msg>,
    conns: Arena<Conn>,
    registry: pool::Registry,
    runtimes: HashMap<String, PoolRuntime>,
    conns_for_server: HashMap<(String, usize), Handle<Conn>>,
    timeouts: crate::timeout::TimeoutWheel,
    rng: StdRng,
    next_msg_id: u64,
    next_frag_id: u64,
    fragments: HashMap<u64, FragmentGroup>,
}

impl Engine {
    /// Builds an engine around an already-populated pool registry and
    /// its per-pool runtime metadata.
    #[must_use]
    pub fn new(registry: pool::Registry, runtimes: HashMap<String, PoolRuntime>, seed: u64) -> Self {
        Self {
            msgs: Arena::new(),
            conns: Arena::new(),
            registry,
            runtimes,
            conns_for_server: HashMap::new(),
            timeouts: crate::timeout::TimeoutWheel::new(),
            rng: StdRng::seed_from_u64(seed),
            next_msg_id: 0,
            next_frag_id: 0,
            fragments: HashMap::new(),
        }
    }

    fn alloc_msg_id(&mut self) -> u64 {
        let id = self.next_msg_id;
        self.next_msg_id += 1;
        id
    }

    /// Registers a connection and returns a handle to it.
    pub fn insert_conn(&mut self, conn: Conn) -> Handle<Conn> {
        self.conns.insert(conn)
    }

    /// Borrows a connection mutably, e.g. so the reactor can drive its
    /// `fill_read_buf`/`drain_write_buf`.
    pub fn conn_mut(&mut self, handle: Handle<Conn>) -> Option<&mut Conn> {
        self.conns.get_mut(handle)
    }

    /// Borrows a connection.
    #[must_use]
    pub fn conn(&self, handle: Handle<Conn>) -> Option<&Conn> {
        self.conns.get(handle)
    }

    /// Looks up the already-open persistent server connection for
    /// `pool_name`'s server at `server_index`, without opening one.
    /// `server` polls this right after a call that could have caused
    /// [`Connector::connect`] to run, to learn the handle of whatever it
    /// just connected (the connect itself is opaque to the caller: it
    /// only learns the raw stream it handed back, not where the engine
    /// filed it in the connection arena).
    #[must_use]
    pub fn server_conn_handle(&self, pool_name: &str, server_index: usize) -> Option<Handle<Conn>> {
        self.conns_for_server.get(&(pool_name.to_string(), server_index)).copied()
    }

    /// The tagged namespace of a key, per the `{tag}key` convention,
    /// for virtual-pool downstream resolution.
    fn namespace_of(hash_tag: Option<(u8, u8)>, key: &[u8]) -> Option<&str> {
        let (open, close) = hash_tag?;
        let start = key.iter().position(|&b| b == open)?;
        let end = key[start + 1..].iter().position(|&b| b == close)?;
        std::str::from_utf8(&key[start + 1..start + 1 + end]).ok()
    }

    /// The hash-tagged routing key (the substring between the tag
    /// delimiters), or the whole key when no tag is configured or found.
    fn routing_key(hash_tag: Option<(u8, u8)>, key: &[u8]) -> &[u8] {
        Self::namespace_of(hash_tag, key).map_or(key, str::as_bytes)
    }

    /// Resolves `pool_name` to the concrete pool a request should route
    /// through, descending through at most one virtual-pool hop.
    fn resolve_concrete_pool(&self, pool_name: &str, key: &[u8]) -> Result<String, ProxyError> {
        let runtime = self.runtimes.get(pool_name).ok_or(ProxyError::ServiceUnavailable)?;
        if !runtime.is_virtual {
            return Ok(pool_name.to_string());
        }
        let namespace = Self::namespace_of(runtime.hash_tag, key);
        Ok(self.registry.resolve_namespace(pool_name, namespace)?.to_string())
    }

    /// Drives the pool-lifecycle ticks: rate-limiter refill by
    /// `elapsed_ms` since the previous tick, active probing and the
    /// timeout sweep by the absolute clock `now` (milliseconds).
    pub fn tick(&mut self, now: u64, elapsed_ms: u64, connector: &mut impl Connector) {
        for pool_name in self.runtimes.keys().cloned().collect::<Vec<_>>() {
            let due = {
                let Some(pool) = self.registry.pool_mut(&pool_name) else { continue };
                if let Some(limiter) = pool.rate_limiter.as_mut() {
                    limiter.tick(elapsed_ms);
                }
                pool.due_for_probe(now)
            };
            for server_index in due {
                self.send_probe(&pool_name, server_index, connector);
            }
        }
        let expired = self.timeouts.expire(now);
        for msg in expired {
            self.on_request_timeout(msg, now);
        }
    }

    fn send_probe(&mut self, pool_name: &str, server_index: usize, connector: &mut impl Connector) {
        let Some(protocol) = self.runtimes.get(pool_name).map(|r| r.protocol) else { return };
        let Some(conn) = self.server_conn_for(pool_name, server_index, connector) else { return };
        #[cfg(feature = "tracing")]
        tracing::debug!(pool = pool_name, server = server_index, "sending active probe");
        if let Some(conn) = self.conns.get_mut(conn) {
            conn.queue_output(protocol.probe_request());
        }
    }

    fn on_request_timeout(&mut self, msg: Handle<Msg>, now: u64) {
        let Some(target) = self.msgs.get(msg).and_then(|m| m.target) else { return };
        self.close_server_conn(target, now);
    }

    /// Looks up (or lazily opens) the single persistent connection for
    /// `pool_name`'s server at `server_index`. The source's
    /// `server_connections` pool of parallel links per server is
    /// collapsed to one persistent connection; nothing in the routing
    /// or pairing logic depends on more than one being open at a time,
    /// and the common configuration is `server_connections: 1` anyway.
    fn server_conn_for(&mut self, pool_name: &str, server_index: usize, connector: &mut impl Connector) -> Option<Handle<Conn>> {
        let key = (pool_name.to_string(), server_index);
        if let Some(existing) = self.conns_for_server.get(&key) {
            if self.conns.contains(*existing) {
                return Some(*existing);
            }
            self.conns_for_server.remove(&key);
        }
        let protocol = self.runtimes.get(pool_name)?.protocol;
        let transport = connector.connect(pool_name, server_index).ok()?;
        let mut conn = Conn::new(Role::Server, transport, protocol, pool_name.to_string(), Some(server_index));
        conn.connected = true;
        let handle = self.conns.insert(conn);
        self.conns_for_server.insert(key, handle);
        if let Some(pool) = self.registry.pool_mut(pool_name) {
            pool.on_server_success(server_index);
        }
        Some(handle)
    }

    /// Parses as many complete requests/fragments as `client`'s read
    /// buffer currently holds and routes each one.
    pub fn drive_client_readable(&mut self, client: Handle<Conn>, now: u64, connector: &mut impl Connector) {
        loop {
            let (protocol, outcome) = {
                let Some(conn) = self.conns.get_mut(client) else { return };
                let Some(mut parser) = conn.request_parser.take() else { return };
                let cap = conn.eof.then_some(conn.read_buf.len());
                let outcome = parser.parse(&conn.read_buf, conn.parse_pos, cap);
                conn.request_parser = Some(parser);
                match &outcome {
                    ParseOutcome::Again => return,
                    ParseOutcome::Repair { token_start } => {
                        conn.read_buf.drain(0..*token_start);
                        conn.parse_pos = 0;
                        return;
                    }
                    ParseOutcome::Error(e) => {
                        conn.parse_pos = conn.read_buf.len();
                        let reply = conn.protocol.error_reply(e);
                        conn.queue_output(&reply);
                        return;
                    }
                    ParseOutcome::Ok { next_pos, .. } | ParseOutcome::Fragment { resume_at: next_pos, .. } => {
                        conn.parse_pos = *next_pos;
                    }
                }
                (conn.protocol, outcome)
            };
            let is_fragment = matches!(outcome, ParseOutcome::Fragment { .. });
            let request = match outcome {
                ParseOutcome::Ok { message, .. } | ParseOutcome::Fragment { message, .. } => message,
                ParseOutcome::Again | ParseOutcome::Repair { .. } | ParseOutcome::Error(_) => unreachable!("handled above"),
            };
            self.req_recv_done(client, protocol, request, is_fragment, now, connector);
        }
    }

    fn req_recv_done(&mut self, client: Handle<Conn>, protocol: Protocol, request: Request, is_fragment: bool, now: u64, connector: &mut impl Connector) {
        if request.quit {
            if let Some(conn) = self.conns.get_mut(client) {
                conn.done = conn.write_buf.is_empty();
            }
            return;
        }

        let frag_id = {
            let Some(conn) = self.conns.get_mut(client) else { return };
            let opens_or_continues = is_fragment || conn.pending_frag.is_some();
            let next_frag_id = &mut self.next_frag_id;
            let id = opens_or_continues.then(|| {
                *conn.pending_frag.get_or_insert_with(|| {
                    let id = *next_frag_id;
                    *next_frag_id += 1;
                    id
                })
            });
            if request.last_fragment {
                conn.pending_frag = None;
            }
            id
        };

        let noreply = request.noreply;
        let command = request.command;
        let last_fragment = request.last_fragment;
        let id = self.alloc_msg_id();
        let mut msg = Msg::new_request(id, request, frag_id, 1, last_fragment);
        msg.owner = Some(client);
        let msg_handle = self.msgs.insert(msg);

        if let Some(frag_id) = frag_id {
            let group = self.fragments.entry(frag_id).or_insert_with(|| FragmentGroup {
                protocol,
                command,
                members: Vec::new(),
                closed: false,
                errored: false,
            });
            group.members.push(msg_handle);
            if last_fragment {
                group.closed = true;
            }
        }
        if !noreply {
            if let Some(conn) = self.conns.get_mut(client) {
                conn.omsg_q.push_back(msg_handle);
            }
        }

        if let Err(error) = self.req_forward(client, msg_handle, now, connector) {
            self.fail_msg(msg_handle, protocol, &error);
        }
    }

    fn fail_msg(&mut self, msg_handle: Handle<Msg>, protocol: Protocol, error: &ProxyError) {
        let wire = match error {
            ProxyError::TooManyRequests => protocol.too_many_requests_reply(),
            _ => protocol.service_unavailable_reply(),
        };
        if let Some(msg) = self.msgs.get_mut(msg_handle) {
            msg.flags.error = true;
            msg.response = Some(Response { shape: ResponseShape::Error, key: None, flags: None, value: None, wire, integer: None, stats: Vec::new() });
        }
        if let Some(frag_id) = self.msgs.get(msg_handle).and_then(|m| m.frag_id) {
            if let Some(group) = self.fragments.get_mut(&frag_id) {
                group.errored = true;
            }
        }
        let owner = self.msgs.get(msg_handle).and_then(|m| m.owner);
        if let Some(owner) = owner {
            self.flush_client_omsg_q(owner);
        }
    }

    fn req_forward(&mut self, client: Handle<Conn>, msg_handle: Handle<Msg>, now: u64, connector: &mut impl Connector) -> Result<(), ProxyError> {
        let base_pool = self.conns.get(client).ok_or(ProxyError::ServiceUnavailable)?.pool_name.clone();
        let (key, wire, noreply, write) = {
            let msg = self.msgs.get(msg_handle).ok_or(ProxyError::StaleHandle)?;
            let request = msg.request.as_ref().ok_or(ProxyError::StaleHandle)?;
            (request.key.clone(), request.wire.clone(), request.noreply, request.command.is_write())
        };

        let concrete_pool = self.resolve_concrete_pool(&base_pool, &key)?;
        let runtime = self.runtimes.get(&concrete_pool).cloned().ok_or(ProxyError::ServiceUnavailable)?;

        {
            let pool = self.registry.pool_mut(&concrete_pool).ok_or(ProxyError::ServiceUnavailable)?;
            let admitted = pool.rate_limiter.as_mut().is_none_or(RateLimiter::try_acquire);
            if !admitted {
                return Err(ProxyError::TooManyRequests);
            }
        }

        let routing_key = Self::routing_key(runtime.hash_tag, &key).to_vec();
        let outcome = self.registry.route(&concrete_pool, &routing_key, write, now, &mut self.rng)?;

        let target = self.server_conn_for(&outcome.pool_name, outcome.server_index, connector).ok_or(ProxyError::ServiceUnavailable)?;
        if let Some(msg) = self.msgs.get_mut(msg_handle) {
            msg.target = Some(target);
        }
        if let Some(target_conn) = self.conns.get_mut(target) {
            target_conn.queue_output(&wire);
            target_conn.omsg_q.push_back(msg_handle);
        }
        if !noreply && runtime.timeout_ms > 0 {
            self.timeouts.schedule(msg_handle, now + runtime.timeout_ms);
        }

        if let Some(plan) = outcome.warmup {
            if let Some(origin_conn) = self.server_conn_for(&base_pool, plan.origin_index, connector) {
                if let Some(msg) = self.msgs.get_mut(msg_handle) {
                    msg.origin = Some(origin_conn);
                }
                if let Some(conn) = self.conns.get_mut(origin_conn) {
                    conn.queue_output(&wire);
                }
            }
        }

        let is_delete = self.msgs.get(msg_handle).and_then(|m| m.request.as_ref()).is_some_and(|r| r.command == Command::Delete);
        if is_delete {
            if let Some(mq_pool) = runtime.message_queue.clone() {
                self.notify_message_queue(&mq_pool, &key, connector);
            }
        }

        Ok(())
    }

    fn notify_message_queue(&mut self, pool_name: &str, key: &[u8], connector: &mut impl Connector) {
        let Some(target) = self.server_conn_for(pool_name, 0, connector) else { return };
        let payload = format!("delete {}", String::from_utf8_lossy(key));
        let wire = format!(
            "*3\r\n$5\r\nLPUSH\r\n${}\r\n{}\r\n${}\r\n{}\r\n",
            pool_name.len(),
            pool_name,
            payload.len(),
            payload
        )
        .into_bytes();
        if let Some(conn) = self.conns.get_mut(target) {
            conn.queue_output(&wire);
        }
    }

    /// Parses as many complete responses as a server connection's read
    /// buffer currently holds, pairing each with the oldest unanswered
    /// request on its `omsg_q`. A probe response (null owner) is never
    /// paired to a client; instead its parsed `STAT` fields are written
    /// back onto the server's cached stats, so peer warm-up (§4.5) can
    /// gate on a `cold` flag a live probe actually set.
    pub fn drive_server_readable(&mut self, server: Handle<Conn>) {
        let Some(conn) = self.conns.get(server) else { return };
        let pool_name = conn.pool_name.clone();
        let server_index = conn.server_index;

        loop {
            let response = {
                let Some(conn) = self.conns.get_mut(server) else { return };
                let Some(mut parser) = conn.response_parser.take() else { return };
                let cap = conn.eof.then_some(conn.read_buf.len());
                let outcome = parser.parse(&conn.read_buf, conn.parse_pos, cap);
                conn.response_parser = Some(parser);
                match outcome {
                    ParseOutcome::Again => return,
                    ParseOutcome::Repair { token_start } => {
                        conn.read_buf.drain(0..token_start);
                        conn.parse_pos = 0;
                        return;
                    }
                    ParseOutcome::Error(_) => {
                        conn.done = true;
                        return;
                    }
                    ParseOutcome::Fragment { .. } => unreachable!("responses never fragment"),
                    ParseOutcome::Ok { message, next_pos } => {
                        conn.parse_pos = next_pos;
                        message
                    }
                }
            };

            if let Some(index) = server_index {
                if let Some(pool) = self.registry.pool_mut(&pool_name) {
                    pool.on_server_success(index);
                }
            }

            let Some(conn) = self.conns.get_mut(server) else { return };
            let Some(msg_handle) = conn.omsg_q.pop_front() else { continue };
            self.timeouts.cancel(msg_handle);

            let origin = self.msgs.get(msg_handle).and_then(|m| m.origin);
            if let (Some(origin_conn), ResponseShape::Value) = (origin, response.shape) {
                if let (Some(key), Some(value)) = (response.key.clone(), response.value.clone()) {
                    let wire = crate::protocol::build_warmup_wire(&key, response.flags.unwrap_or(0), &value);
                    if let Some(conn) = self.conns.get_mut(origin_conn) {
                        conn.queue_output(&wire);
                    }
                }
            }

            let owner = self.msgs.get(msg_handle).and_then(|m| m.owner);
            if owner.is_none() {
                if let Some(index) = server_index {
                    if !response.stats.is_empty() {
                        if let Some(pool) = self.registry.pool_mut(&pool_name) {
                            pool.apply_stat_probe(index, &response.stats);
                        }
                    }
                }
                self.msgs.remove(msg_handle);
                continue;
            }
            if let Some(msg) = self.msgs.get_mut(msg_handle) {
                msg.response = Some(response);
            }
            if let Some(owner) = owner {
                self.flush_client_omsg_q(owner);
            }
        }
    }

    /// Delivers every response at the front of `client`'s queue that is
    /// now ready, in arrival order, stopping at the first still-pending
    /// entry (or incomplete fragment group).
    fn flush_client_omsg_q(&mut self, client: Handle<Conn>) {
        loop {
            let Some(front) = self.conns.get(client).and_then(|c| c.omsg_q.front().copied()) else { return };
            let Some(msg) = self.msgs.get(front) else {
                if let Some(conn) = self.conns.get_mut(client) {
                    conn.omsg_q.pop_front();
                }
                continue;
            };

            if let Some(frag_id) = msg.frag_id {
                let Some(group) = self.fragments.get(&frag_id) else { return };
                if !group.closed {
                    return;
                }
                let ready = group.members.iter().all(|m| self.msgs.get(*m).is_some_and(|mm| mm.response.is_some()));
                if !ready {
                    return;
                }
                let FragmentGroup { protocol, command, members, errored, .. } = self.fragments.remove(&frag_id).expect("checked above");
                if let Some(conn) = self.conns.get_mut(client) {
                    for _ in 0..members.len() {
                        conn.omsg_q.pop_front();
                    }
                }
                let responses: Vec<_> = members.iter().filter_map(|m| self.msgs.remove(*m).and_then(|mm| mm.response)).collect();
                let combined = if errored {
                    responses.into_iter().find(|r| r.shape == ResponseShape::Error).unwrap_or(Response {
                        shape: ResponseShape::Error,
                        key: None,
                        flags: None,
                        value: None,
                        wire: protocol.service_unavailable_reply(),
                        integer: None,
                        stats: Vec::new(),
                    })
                } else {
                    let command_name: &[u8] = match command {
                        Command::Get => b"MGET",
                        Command::Delete => b"DEL",
                        Command::Set => b"MSET",
                        Command::Other => b"",
                    };
                    fragment::coalesce(protocol, command_name, &responses)
                };
                if let Some(conn) = self.conns.get_mut(client) {
                    conn.queue_output(&combined.wire);
                }
            } else {
                if msg.response.is_none() {
                    return;
                }
                if let Some(conn) = self.conns.get_mut(client) {
                    conn.omsg_q.pop_front();
                }
                let response = self.msgs.remove(front).and_then(|m| m.response);
                if let (Some(conn), Some(response)) = (self.conns.get_mut(client), response) {
                    conn.queue_output(&response.wire);
                }
            }
        }
    }

    /// Drains a connection's write buffer; the reactor calls this on
    /// every writable event for both client and server connections.
    pub fn drive_writable(&mut self, conn: Handle<Conn>, now: u64) -> io::Result<()> {
        let Some(c) = self.conns.get_mut(conn) else { return Ok(()) };
        let flushed = c.drain_write_buf()?;
        if flushed && c.done {
            self.close_conn(conn, now);
        }
        Ok(())
    }

    /// Runs the role-appropriate close cascade and removes `conn` from
    /// the arena.
    pub fn close_conn(&mut self, conn: Handle<Conn>, now: u64) {
        match self.conns.get(conn).map(|c| c.role) {
            Some(Role::Server) => self.close_server_conn(conn, now),
            Some(Role::Client) => self.close_client_conn(conn),
            None => {}
        }
    }

    /// A server connection's close policy: every in-flight request is
    /// errored and, unless orphaned, its owning client's response queue
    /// is unblocked with an error reply; the close is also reported to
    /// the owning pool as a failure, so repeated backend drops actually
    /// drive `auto_eject_hosts` ejection (§4.4/§4.5) instead of only the
    /// continuum built at startup.
    fn close_server_conn(&mut self, server: Handle<Conn>, now: u64) {
        let Some(conn) = self.conns.remove(server) else { return };
        if let Some(index) = conn.server_index {
            self.conns_for_server.remove(&(conn.pool_name.clone(), index));
            if let Some(pool) = self.registry.pool_mut(&conn.pool_name) {
                pool.on_server_failure(index, now);
            }
        }
        #[cfg(feature = "tracing")]
        tracing::warn!(pool = %conn.pool_name, server = ?conn.server_index, in_flight = conn.omsg_q.len(), "server connection closed");
        let protocol = self.runtimes.get(&conn.pool_name).map_or(Protocol::Memcache, |r| r.protocol);
        for msg_handle in conn.omsg_q {
            self.timeouts.cancel(msg_handle);
            self.fail_msg(msg_handle, protocol, &ProxyError::ServiceUnavailable);
        }
    }

    /// A client connection's close policy: in-flight requests already
    /// forwarded are orphaned (kept on the server's `omsg_q`, marked
    /// swallowed) rather than errored, so their eventual response is
    /// discarded silently instead of being written to a closed socket.
    fn close_client_conn(&mut self, client: Handle<Conn>) {
        let Some(conn) = self.conns.remove(client) else { return };
        for msg_handle in conn.omsg_q {
            if let Some(msg) = self.msgs.get_mut(msg_handle) {
                msg.owner = None;
                msg.flags.swallow = true;
            }
        }
    }
}
