//! C10: a bounded idle+active connection pool with FIFO waiters
//! (spec.md §4.10), used by the cluster coordinator to hold connections
//! to peer nodes. `spineldb` has no direct counterpart — its blocking
//! waiter pattern in `core/blocking.rs` (`oneshot` + a `VecDeque` queue
//! per key, woken FIFO) is the closest thing in the teacher's own idiom,
//! so that shape is reused here for waiters on a pool slot instead of
//! waiters on a key.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Creates new pooled connections on demand. Implemented by whatever
/// transport the cluster coordinator's peer client uses (spec.md
/// §4.12's `ClusterTransport` boundary).
#[async_trait]
pub trait ConnectionFactory<T>: Send + Sync {
    async fn create(&self) -> Result<T>;
}

struct Waiter<T> {
    tx: oneshot::Sender<Result<T>>,
}

struct State<T> {
    idle: VecDeque<T>,
    active: usize,
    closed: bool,
    waiters: VecDeque<Waiter<T>>,
}

pub struct ConnectionPool<T> {
    factory: Arc<dyn ConnectionFactory<T>>,
    max_idle: usize,
    max_active: usize,
    state: Mutex<State<T>>,
}

enum GetAction<T> {
    Ready(T),
    Create,
    Wait(oneshot::Receiver<Result<T>>),
}

impl<T: Send + 'static> ConnectionPool<T> {
    pub fn new(factory: Arc<dyn ConnectionFactory<T>>, max_idle: usize, max_active: usize) -> Self {
        Self {
            factory,
            max_idle: max_idle.max(1),
            max_active: max_active.max(1),
            state: Mutex::new(State {
                idle: VecDeque::new(),
                active: 0,
                closed: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Returns an idle connection if one exists; otherwise creates one
    /// (if under `max_active`); otherwise parks as a FIFO waiter until
    /// `put` or `close` resolves it.
    pub async fn get(&self) -> Result<T> {
        let action = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(conn) = state.idle.pop_front() {
                GetAction::Ready(conn)
            } else if state.active < self.max_active {
                state.active += 1;
                GetAction::Create
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(Waiter { tx });
                GetAction::Wait(rx)
            }
        };
        match action {
            GetAction::Ready(conn) => Ok(conn),
            GetAction::Create => match self.factory.create().await {
                Ok(conn) => Ok(conn),
                Err(e) => {
                    // No active slot is reserved on factory failure.
                    self.state.lock().active -= 1;
                    Err(e)
                }
            },
            GetAction::Wait(rx) => match rx.await {
                Ok(result) => result,
                Err(_) => Err(Error::PoolClosed),
            },
        }
    }

    /// Returns `conn` to the pool: hands it to the oldest waiter if one
    /// is parked, otherwise parks it as idle (up to `max_idle`),
    /// otherwise drops it and frees its active slot.
    pub fn put(&self, conn: T) {
        let mut state = self.state.lock();
        let mut conn = conn;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.tx.send(Ok(conn)) {
                Ok(()) => return,
                Err(Ok(returned)) => conn = returned,
                Err(Err(_)) => unreachable!("put only ever sends Ok"),
            }
        }
        if state.idle.len() < self.max_idle {
            state.idle.push_back(conn);
        } else {
            state.active -= 1;
            drop(conn);
        }
    }

    /// Drains idle connections and wakes every parked waiter with
    /// `PoolLimit` (spec.md §4.10: "waiters woken by Close observe
    /// MaxLimit"). Subsequent `get` calls return `PoolClosed`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.idle.clear();
        for waiter in state.waiters.drain(..) {
            let _ = waiter.tx.send(Err(Error::PoolLimit));
        }
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }
}
