//! C3: deferred task scheduling for TTL expirations.
//!
//! A min-heap ordered by fire instant, driven by one background task.
//! `At` is O(log n); cancellation is O(1) amortized (it just detaches the
//! task-key from its current generation — the heap entry is discarded
//! when it's eventually popped). Handlers run on their own spawned task
//! so they can acquire locks without blocking the scheduler loop.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::sleep_until;

pub type TimedTask = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct HeapEntry {
    instant: Instant,
    id: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.instant == other.instant && self.id == other.id
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap.
        other
            .instant
            .cmp(&self.instant)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct PendingTask {
    key: Bytes,
    task: TimedTask,
}

struct Inner {
    heap: Mutex<BinaryHeap<HeapEntry>>,
    tasks: Mutex<HashMap<u64, PendingTask>>,
    by_key: DashMap<Bytes, u64>,
    notify: Notify,
    next_id: AtomicU64,
}

#[derive(Clone)]
pub struct TimeWheel {
    inner: Arc<Inner>,
}

impl TimeWheel {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            heap: Mutex::new(BinaryHeap::new()),
            tasks: Mutex::new(HashMap::new()),
            by_key: DashMap::new(),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
        });
        let wheel = Self { inner };
        wheel.spawn_driver();
        wheel
    }

    /// Schedules `task` to run at `instant`, keyed by `key`. Scheduling a
    /// new task for a key that already has one pending implicitly
    /// supersedes the old one (its generation is dropped from `by_key`).
    pub fn at(&self, instant: Instant, key: Bytes, task: TimedTask) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .tasks
            .lock()
            .insert(id, PendingTask { key: key.clone(), task });
        self.inner.by_key.insert(key, id);
        self.inner.heap.lock().push(HeapEntry { instant, id });
        self.inner.notify.notify_one();
    }

    /// Removes a pending task for `key`, if any. Already-fired tasks are
    /// unaffected; a task that fires concurrently with `cancel` may still
    /// run (the handler itself must re-check preconditions).
    pub fn cancel(&self, key: &[u8]) {
        self.inner.by_key.remove(key);
    }

    fn spawn_driver(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                let next = inner.heap.lock().peek().map(|e| e.instant);
                match next {
                    None => inner.notify.notified().await,
                    Some(instant) => {
                        if instant <= Instant::now() {
                            Self::fire_next(&inner);
                        } else {
                            tokio::select! {
                                _ = sleep_until(instant.into()) => {}
                                _ = inner.notify.notified() => {}
                            }
                        }
                    }
                }
            }
        });
    }

    fn fire_next(inner: &Arc<Inner>) {
        let entry = inner.heap.lock().pop();
        let Some(entry) = entry else { return };
        let pending = inner.tasks.lock().remove(&entry.id);
        let Some(pending) = pending else { return };
        // Only run if this is still the live generation for its key —
        // a later `at()` call for the same key supersedes this one.
        let is_current = inner
            .by_key
            .get(&pending.key)
            .map(|g| *g == entry.id)
            .unwrap_or(false);
        if !is_current {
            return;
        }
        inner.by_key.remove(&pending.key);
        tokio::spawn((pending.task)());
    }
}

impl Default for TimeWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_once_at_deadline() {
        let wheel = TimeWheel::new();
        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        wheel.at(
            Instant::now() + Duration::from_millis(30),
            Bytes::from_static(b"k"),
            Box::new(move || {
                Box::pin(async move {
                    f.store(true, Ordering::SeqCst);
                })
            }),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_task_never_fires() {
        let wheel = TimeWheel::new();
        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        wheel.at(
            Instant::now() + Duration::from_millis(30),
            Bytes::from_static(b"k"),
            Box::new(move || {
                Box::pin(async move {
                    f.store(true, Ordering::SeqCst);
                })
            }),
        );
        wheel.cancel(b"k");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn rescheduling_supersedes_prior_task() {
        let wheel = TimeWheel::new();
        let count = Arc::new(AtomicU64::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&count);
            wheel.at(
                Instant::now() + Duration::from_millis(30),
                Bytes::from_static(b"k"),
                Box::new(move || {
                    Box::pin(async move {
                        c.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            );
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
