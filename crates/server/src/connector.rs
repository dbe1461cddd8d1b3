//! Opens backend connections for [`proxy_core::engine::Engine`].
//!
//! [`proxy_core::engine::Connector::connect`] is synchronous: the engine
//! calls it inline while routing a request and immediately marks the
//! resulting connection `connected`, the same way the source treats a
//! freshly `connect()`-ed socket as usable right away and lets the
//! kernel buffer writes until the TCP handshake completes. This
//! connector does the real equivalent: a blocking `std::net::TcpStream`
//! connect (backend connects are rare — lazily on first use per server,
//! or on reconnect after an eject — and typically LAN-local, so this
//! does not meaningfully stall the single-threaded reactor), then hands
//! the socket to `tokio` non-blocking.
//!
//! The engine inserts the returned [`Transport`] into its connection
//! arena itself and never tells the caller what handle it was filed
//! under, so a newly opened connection needs a second handshake to get
//! a driver task watching it: [`TokioConnector::connect`] stashes every
//! socket it just opened in `pending`, and the reactor drains that
//! list right after each engine call that could have triggered a
//! connect, looking up the resulting handle via
//! [`proxy_core::engine::Engine::server_conn_handle`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use proxy_core::conn::Transport;
use proxy_core::engine::Connector;
use tokio::net::TcpStream;

use crate::transport::TokioTransport;

/// A backend socket [`TokioConnector::connect`] just opened, not yet
/// claimed by a driver task.
pub type PendingConnect = (String, usize, Rc<TcpStream>);

/// Opens and tracks backend connections over pre-resolved addresses.
#[derive(Clone)]
pub struct TokioConnector {
    addrs: Rc<HashMap<(String, usize), SocketAddr>>,
    pending: Rc<RefCell<Vec<PendingConnect>>>,
}

impl TokioConnector {
    /// Builds a connector over every pool/server-index's resolved
    /// address, as produced at startup from [`config::PoolConfig::servers`].
    #[must_use]
    pub fn new(addrs: HashMap<(String, usize), SocketAddr>) -> Self {
        Self { addrs: Rc::new(addrs), pending: Rc::new(RefCell::new(Vec::new())) }
    }

    /// Drains every backend socket opened since the last call, for the
    /// reactor to spawn a driver task over.
    pub fn drain_pending(&self) -> Vec<PendingConnect> {
        self.pending.borrow_mut().drain(..).collect()
    }
}

impl Connector for TokioConnector {
    fn connect(&mut self, pool_name: &str, server_index: usize) -> io::Result<Box<dyn Transport>> {
        let addr = *self
            .addrs
            .get(&(pool_name.to_string(), server_index))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no resolved address for {pool_name}[{server_index}]")))?;

        let std_stream = std::net::TcpStream::connect(addr)?;
        std_stream.set_nonblocking(true)?;
        std_stream.set_nodelay(true)?;
        let stream = Rc::new(TcpStream::from_std(std_stream)?);

        #[cfg(feature = "tracing")]
        tracing::debug!(pool = pool_name, server = server_index, %addr, "opened backend connection");

        self.pending.borrow_mut().push((pool_name.to_string(), server_index, stream.clone()));
        Ok(Box::new(TokioTransport::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdListener;

    #[tokio::test]
    async fn connect_queues_the_opened_socket_as_pending() {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let _ = listener.accept();
        });

        let mut addrs = HashMap::new();
        addrs.insert(("cache".to_string(), 0), addr);
        let mut connector = TokioConnector::new(addrs);

        let _transport = connector.connect("cache", 0).expect("connects");
        let pending = connector.drain_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, "cache");
        assert_eq!(pending[0].1, 0);
        assert!(connector.drain_pending().is_empty());
    }

    #[tokio::test]
    async fn connect_to_unknown_server_index_fails() {
        let mut connector = TokioConnector::new(HashMap::new());
        let error = connector.connect("cache", 0).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotFound);
    }
}
