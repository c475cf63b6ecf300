//! Bounds how many tasks may be doing synchronous CPU work at once, so that a burst
//! of plugin executions or large-frame JSON encodes can't starve the I/O-bound tasks
//! sharing the same runtime.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Process-wide admission control. One instance is shared by the scheduler's check
/// executor, the cluster transport's frame codec, and any other component that does
/// non-trivial synchronous work inside an async task.
#[derive(Clone)]
pub struct IoEngine {
    cpu_semaphore: Arc<Semaphore>,
}

impl IoEngine {
    /// `concurrency` bounds concurrent CPU-bound sections; `0` falls back to
    /// `num_cpus::get()`.
    pub fn new(concurrency: usize) -> Self {
        let n = if concurrency == 0 { num_cpus::get() } else { concurrency };
        Self {
            cpu_semaphore: Arc::new(Semaphore::new(n)),
        }
    }

    /// Acquire a CPU-bound permit, awaiting if the pool is saturated.
    pub async fn enter_cpu_bound(&self) -> CpuBoundWork {
        let permit = self
            .cpu_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("admission semaphore is never closed");
        CpuBoundWork {
            engine: self.clone(),
            permit: Some(permit),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.cpu_semaphore.available_permits()
    }
}

/// Held while a task is doing CPU-bound work. Dropping it releases the permit,
/// including on panic unwind.
pub struct CpuBoundWork {
    engine: IoEngine,
    permit: Option<OwnedSemaphorePermit>,
}

impl CpuBoundWork {
    /// Give up the permit for the duration of an I/O-bound sub-operation. Call
    /// [`IoBoundWorkSlot::resume`] to reacquire before doing more CPU work.
    pub fn suspend_for_io(mut self) -> IoBoundWorkSlot {
        let permit = self.permit.take();
        drop(permit);
        IoBoundWorkSlot { engine: self.engine.clone() }
    }
}

/// The complement of [`CpuBoundWork`]: held while a task that was doing CPU work is
/// now blocked on I/O instead, freeing its permit for other CPU-bound work.
pub struct IoBoundWorkSlot {
    engine: IoEngine,
}

impl IoBoundWorkSlot {
    pub async fn resume(self) -> CpuBoundWork {
        self.engine.enter_cpu_bound().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admission_bounds_concurrency() {
        let engine = IoEngine::new(1);
        let first = engine.enter_cpu_bound().await;
        assert_eq!(engine.available_permits(), 0);
        let slot = first.suspend_for_io();
        assert_eq!(engine.available_permits(), 1);
        let second = engine.enter_cpu_bound().await;
        assert_eq!(engine.available_permits(), 0);
        drop(second);
        let _resumed = slot.resume().await;
    }
}
