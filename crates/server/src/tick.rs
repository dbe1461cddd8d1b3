//! The pool-lifecycle tick: rate-limiter refill, active probing, and the
//! request timeout sweep, driven on a fixed interval independent of any
//! connection's readiness.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use proxy_core::engine::Engine;
use tokio::time::interval;

use crate::clock::now_usec;
use crate::connector::TokioConnector;
use crate::driver::spawn_pending_servers;

/// How often [`Engine::tick`] runs; an active probe or retry-timeout
/// boundary is detected within this granularity.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Runs [`Engine::tick`] on a fixed interval until the task is dropped
/// (the reactor never cancels this itself; it lives as long as the
/// process does).
pub async fn run(engine: Rc<RefCell<Engine>>, mut connector: TokioConnector) {
    let mut ticker = interval(TICK_INTERVAL);
    let mut last = now_usec();
    loop {
        ticker.tick().await;
        let now = now_usec();
        let elapsed_ms = (now.saturating_sub(last)) / 1000;
        last = now;
        engine.borrow_mut().tick(now, elapsed_ms, &mut connector);
        spawn_pending_servers(&engine, &connector);
    }
}
