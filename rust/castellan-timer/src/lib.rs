//! A single global ordered index of timer entries, sorted by next fire time, backed
//! by one `parking_lot::Mutex` and one `tokio::sync::Notify`.
//!
//! A dedicated worker task peeks the earliest entry; if it is not yet due, it sleeps
//! until either that deadline or a wake-up notification (a new, earlier entry was
//! inserted). When an entry is due it is removed from the index, marked running, and
//! its callback dispatched onto its own `tokio::spawn`ed task -- so two distinct
//! timers may run concurrently, but the same timer never runs concurrently with
//! itself, because while it is running it simply isn't present in the index for the
//! worker to find again.

pub mod error;

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

pub use error::{TimerError, TimerResult};

/// A callback is an `FnMut`-free boxed async closure so it can be shared across
/// repeated firings of a periodic timer without cloning the captured state.
pub type TimerCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

struct TimerHandle {
    id: TimerId,
    interval: Option<Duration>,
    callback: TimerCallback,
    running: AtomicBool,
    cancelled: AtomicBool,
}

#[derive(Clone, Copy, Eq, PartialEq)]
struct ScheduleKey {
    next_fire: Instant,
    id: TimerId,
}

impl Ord for ScheduleKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.next_fire.cmp(&other.next_fire).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ScheduleKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The global timer index plus its worker loop.
pub struct TimerSet {
    heap: Mutex<BinaryHeap<Reverse<ScheduleKey>>>,
    handles: DashMap<TimerId, Arc<TimerHandle>>,
    notify: Notify,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl TimerSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            handles: DashMap::new(),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Spawn the worker task. Returns a `JoinHandle`; dropping it does not stop the
    /// worker, call [`TimerSet::stop`] for that.
    pub fn spawn_worker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run().await })
    }

    fn next_id(&self) -> TimerId {
        TimerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, id: TimerId, next_fire: Instant, interval: Option<Duration>, callback: TimerCallback) {
        let handle = Arc::new(TimerHandle {
            id,
            interval,
            callback,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        });
        self.handles.insert(id, handle);
        self.heap.lock().push(Reverse(ScheduleKey { next_fire, id }));
        self.notify.notify_one();
    }

    pub fn add_periodic(&self, interval: Duration, callback: TimerCallback) -> TimerId {
        let id = self.next_id();
        self.insert(id, Instant::now() + interval, Some(interval), callback);
        id
    }

    pub fn add_oneshot(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let id = self.next_id();
        self.insert(id, Instant::now() + delay, None, callback);
        id
    }

    /// Cancel a timer. If it is currently running, its in-flight execution still
    /// completes but it will not be rescheduled.
    pub fn cancel(&self, id: TimerId) -> TimerResult<()> {
        match self.handles.get(&id) {
            Some(h) => {
                h.cancelled.store(true, Ordering::Release);
                self.notify.notify_one();
                Ok(())
            }
            None => Err(TimerError::NotFound(id)),
        }
    }

    /// Shift every pending entry's `next_fire` by `delta`, forward if `forward` else
    /// backward, clamping at the current instant. Used when a wall-clock jump is
    /// detected so check intervals don't all fire at once to "catch up".
    pub fn adjust_timers(&self, delta: Duration, forward: bool) {
        let mut heap = self.heap.lock();
        let now = Instant::now();
        let entries: Vec<_> = heap.drain().collect();
        for Reverse(mut key) in entries {
            key.next_fire = if forward {
                key.next_fire + delta
            } else {
                key.next_fire.checked_sub(delta).unwrap_or(now)
            };
            if key.next_fire < now {
                key.next_fire = now;
            }
            heap.push(Reverse(key));
        }
        drop(heap);
        self.notify.notify_one();
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.handles
            .get(&id)
            .map(|h| h.running.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Request shutdown. If `wait` is true, block until every timer that was
    /// running at the time of the call has finished its current execution.
    pub async fn stop(&self, wait: bool) {
        self.shutdown.cancel();
        for entry in self.handles.iter() {
            entry.cancelled.store(true, Ordering::Release);
        }
        self.notify.notify_one();
        if wait {
            loop {
                let any_running = self.handles.iter().any(|h| h.running.load(Ordering::Acquire));
                if !any_running {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            let next_deadline = self.dispatch_due();
            if self.shutdown.is_cancelled() && self.handles.is_empty() {
                break;
            }
            match next_deadline {
                Some(instant) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(instant) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                None => {
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = self.shutdown.cancelled() => {}
                    }
                }
            }
        }
        trace!("timer worker stopped");
    }

    /// Pop and dispatch every entry that is currently due. Returns the next
    /// deadline to wait for, or `None` if the index is empty.
    fn dispatch_due(&self) -> Option<Instant> {
        loop {
            let mut heap = self.heap.lock();
            let top = match heap.peek() {
                Some(Reverse(k)) => *k,
                None => return None,
            };
            let handle = match self.handles.get(&top.id) {
                Some(h) => h.clone(),
                None => {
                    heap.pop();
                    continue;
                }
            };
            if handle.cancelled.load(Ordering::Acquire) {
                heap.pop();
                drop(heap);
                self.handles.remove(&top.id);
                continue;
            }
            let now = Instant::now();
            if top.next_fire > now {
                return Some(top.next_fire);
            }
            heap.pop();
            drop(heap);
            handle.running.store(true, Ordering::Release);
            self.dispatch(handle);
        }
    }

    fn dispatch(self: &Arc<Self>, handle: Arc<TimerHandle>) {
        let this = self.clone();
        tokio::spawn(async move {
            trace!(timer = handle.id.0, "dispatching");
            let fut = (handle.callback)();
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                error!(timer = handle.id.0, ?panic, "timer callback panicked");
            } else {
                debug!(timer = handle.id.0, "callback completed");
            }
            handle.running.store(false, Ordering::Release);
            if handle.cancelled.load(Ordering::Acquire) {
                this.handles.remove(&handle.id);
                return;
            }
            match handle.interval {
                Some(interval) => {
                    let next_fire = Instant::now() + interval;
                    this.heap.lock().push(Reverse(ScheduleKey {
                        next_fire,
                        id: handle.id,
                    }));
                    this.notify.notify_one();
                }
                None => {
                    this.handles.remove(&handle.id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn oneshot_fires_once() {
        let timers = TimerSet::new();
        let _worker = timers.spawn_worker();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        timers.add_oneshot(
            Duration::from_millis(10),
            Arc::new(move || {
                let c = c.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn periodic_fires_multiple_times() {
        let timers = TimerSet::new();
        let _worker = timers.spawn_worker();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let id = timers.add_periodic(
            Duration::from_millis(10),
            Arc::new(move || {
                let c = c.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        tokio::time::sleep(Duration::from_millis(55)).await;
        timers.cancel(id).unwrap();
        let fired = counter.load(Ordering::SeqCst);
        assert!(fired >= 3, "expected at least 3 firings, got {fired}");
    }

    #[tokio::test]
    async fn cancel_prevents_further_firing() {
        let timers = TimerSet::new();
        let _worker = timers.spawn_worker();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let id = timers.add_periodic(
            Duration::from_millis(10),
            Arc::new(move || {
                let c = c.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );
        tokio::time::sleep(Duration::from_millis(15)).await;
        timers.cancel(id).unwrap();
        let after_cancel = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), after_cancel);
    }
}
