//! One accept loop per configured pool's listen address.

use std::cell::RefCell;
use std::rc::Rc;

use proxy_core::conn::{Conn, Role};
use proxy_core::engine::Engine;
use proxy_core::protocol::Protocol;
use tokio::net::TcpListener;

use crate::connector::TokioConnector;
use crate::driver::spawn_client;
use crate::error::ServerError;
use crate::transport::TokioTransport;

/// Binds `listen` and accepts client connections for `pool_name` until
/// the socket errors or the task is cancelled.
pub async fn accept_loop(
    engine: Rc<RefCell<Engine>>,
    connector: TokioConnector,
    pool_name: String,
    protocol: Protocol,
    listen: String,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(listen.as_str()).await.map_err(|source| ServerError::Bind { addr: listen.clone(), source })?;
    #[cfg(feature = "tracing")]
    tracing::info!(pool = %pool_name, addr = %listen, "listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(pool = %pool_name, %error, "accept failed");
                continue;
            }
        };
        let _ = stream.set_nodelay(true);
        #[cfg(feature = "tracing")]
        tracing::debug!(pool = %pool_name, %peer, "accepted client connection");
        #[cfg(not(feature = "tracing"))]
        let _ = peer;

        let stream = Rc::new(stream);
        let transport = Box::new(TokioTransport::new(stream.clone()));
        let conn = Conn::new(Role::Client, transport, protocol, pool_name.clone(), None);
        let handle = engine.borrow_mut().insert_conn(conn);
        spawn_client(engine.clone(), connector.clone(), handle, stream);
    }
}
