//! A timeout wheel for in-flight server requests. Every enqueue onto a
//! server connection's `imsg_q` (barring `noreply`) registers a
//! deadline here; the reactor's tick sweeps expired entries and hands
//! them back for the server close policy to cascade.

use std::collections::BTreeMap;

use crate::arena::Handle;
use crate::message::Msg;

/// A pending deadline, keyed so expiry order is cheap to maintain
/// without per-message prev/next pointers: a `BTreeMap` keyed by
/// `(deadline, insertion order)` gives sorted sweep order and O(log n)
/// cancellation, standing in for the source's per-bucket wheel without
/// its fixed-resolution bucketing (this proxy's request volume does not
/// need wheel-bucket granularity to keep sweep cost low).
#[derive(Default)]
pub struct TimeoutWheel {
    by_deadline: BTreeMap<(u64, u64), Handle<Msg>>,
    by_msg: std::collections::HashMap<Handle<Msg>, (u64, u64)>,
    next_seq: u64,
}

impl TimeoutWheel {
    /// An empty wheel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `msg` to expire at `deadline` (an absolute tick count
    /// or epoch-millis value, matching whatever clock the caller's
    /// `now` uses elsewhere).
    pub fn schedule(&mut self, msg: Handle<Msg>, deadline: u64) {
        let key = (deadline, self.next_seq);
        self.next_seq += 1;
        self.by_deadline.insert(key, msg);
        self.by_msg.insert(msg, key);
    }

    /// Cancels `msg`'s pending deadline, if any (its response arrived
    /// before the timeout fired).
    pub fn cancel(&mut self, msg: Handle<Msg>) {
        if let Some(key) = self.by_msg.remove(&msg) {
            self.by_deadline.remove(&key);
        }
    }

    /// Removes and returns every message whose deadline is `<= now`, in
    /// deadline order.
    pub fn expire(&mut self, now: u64) -> Vec<Handle<Msg>> {
        let expired: Vec<(u64, u64)> = self.by_deadline.range(..=(now, u64::MAX)).map(|(k, _)| *k).collect();
        let mut msgs = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(msg) = self.by_deadline.remove(&key) {
                self.by_msg.remove(&msg);
                msgs.push(msg);
            }
        }
        msgs
    }

    /// The earliest pending deadline, if any; the reactor can use this
    /// to size its next poll timeout.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.by_deadline.keys().next().map(|(deadline, _)| *deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    #[test]
    fn expire_returns_only_due_entries_in_deadline_order() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let c = arena.insert(3);
        let mut wheel = TimeoutWheel::new();
        wheel.schedule(a, 100);
        wheel.schedule(b, 50);
        wheel.schedule(c, 200);

        let due = wheel.expire(150);
        assert_eq!(due, vec![b, a]);
        assert_eq!(wheel.next_deadline(), Some(200));
    }

    #[test]
    fn cancel_removes_before_expiry() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.insert(1);
        let mut wheel = TimeoutWheel::new();
        wheel.schedule(a, 100);
        wheel.cancel(a);
        assert!(wheel.expire(1000).is_empty());
    }

    #[test]
    fn next_deadline_is_none_when_empty() {
        let wheel = TimeoutWheel::new();
        assert_eq!(wheel.next_deadline(), None);
    }
}
