//! Idle connection pool shared by every store operation

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Connections waiting to be reused
///
/// The lock only guards the idle list. Connecting and running commands happen
/// outside it, so one slow round trip never stalls other threads.
pub(crate) struct Pool<C> {
    idle: Mutex<VecDeque<C>>,
    max_idle: usize,
}

impl<C> Pool<C> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(VecDeque::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Take the most recently returned connection, or open one with `connect`
    pub fn checkout<E>(&self, connect: impl FnOnce() -> Result<C, E>) -> Result<C, E> {
        // Bound to a local so the guard is released before connecting
        let reused = self.idle.lock().pop_back();
        match reused {
            Some(conn) => Ok(conn),
            None => connect(),
        }
    }

    /// Hand a healthy connection back; past `max_idle` it is closed instead
    pub fn checkin(&self, conn: C) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push_back(conn);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}
