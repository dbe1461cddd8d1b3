#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `server` binds `proxy-core`'s reactor-agnostic [`proxy_core::engine::Engine`]
//! to real sockets over `tokio`: one accept loop per configured pool,
//! one driver task per connection (client or backend) watching its
//! socket's readiness, and one tick task driving the pool-lifecycle
//! sweep on a fixed interval. Everything runs on a single OS thread
//! inside a `tokio::task::LocalSet`, since the engine and every
//! connection's transport are `Rc`-shared rather than `Arc`-shared —
//! the proxy needs no cross-thread work-stealing, only cooperative
//! multiplexing of many sockets, so a `LocalSet` avoids paying for
//! synchronization the workload never needs.
//!
//! # Design
//!
//! [`setup::build`] turns a validated [`config::Config`] into a
//! [`pool::Registry`] plus the routing metadata
//! [`proxy_core::engine::Engine`] needs, resolving every backend
//! hostname once at startup. [`connector::TokioConnector`] is the one
//! place backend sockets get opened; because
//! [`proxy_core::engine::Connector::connect`] is synchronous and the
//! engine files the resulting connection away without telling the
//! caller its handle, the connector stashes every socket it opens and
//! [`driver::spawn_pending_servers`] claims them right after each engine
//! call that could have triggered a connect.

mod accept;
mod clock;
mod connector;
mod driver;
mod error;
mod setup;
mod tick;
mod transport;

use std::cell::RefCell;
use std::rc::Rc;

use config::Config;
use proxy_core::engine::Engine;

pub use connector::TokioConnector;
pub use error::ServerError;
pub use setup::{build, Topology};
pub use transport::TokioTransport;

/// Runs the proxy reactor against `config` until cancelled. Must be
/// called from inside a [`tokio::task::LocalSet`] (the accept, driver,
/// and tick tasks this spawns are all `!Send`).
///
/// # Errors
///
/// Returns an error if any pool's `listen` address fails to bind or any
/// configured server fails to resolve; both are startup-time failures,
/// so this returns before any accept loop starts handling traffic.
pub async fn run(config: &Config, seed: u64) -> Result<(), ServerError> {
    let Topology { registry, runtimes, connector, listeners } = setup::build(config)?;
    let engine = Rc::new(RefCell::new(Engine::new(registry, runtimes, seed)));

    for (pool_name, protocol, listen) in listeners {
        let engine = engine.clone();
        let connector = connector.clone();
        tokio::task::spawn_local(async move {
            if let Err(error) = accept::accept_loop(engine, connector, pool_name.clone(), protocol, listen).await {
                #[cfg(feature = "tracing")]
                tracing::error!(pool = %pool_name, %error, "accept loop exited");
                #[cfg(not(feature = "tracing"))]
                let _ = (pool_name, error);
            }
        });
    }

    tokio::task::spawn_local(tick::run(engine.clone(), connector));

    notify_ready();

    tokio::signal::ctrl_c().await.map_err(ServerError::Signal)?;
    #[cfg(feature = "tracing")]
    tracing::info!("shutdown signal received");
    Ok(())
}

#[cfg(feature = "sd-notify")]
fn notify_ready() {
    if let Err(_error) = sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %_error, "sd_notify READY=1 failed");
    }
}

#[cfg(not(feature = "sd-notify"))]
fn notify_ready() {}
