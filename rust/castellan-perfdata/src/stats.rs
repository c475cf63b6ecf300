//! Lock-free stats snapshot, following the same `arc_swap::ArcSwap` pattern used
//! elsewhere in this codebase for hot-path reads that must never block a writer.

use std::sync::Arc;

use arc_swap::ArcSwap;

#[derive(Debug, Clone, Default)]
pub struct WriterStats {
    pub queued: u64,
    pub sent: u64,
    pub dropped: u64,
    pub last_error: Option<String>,
}

pub struct StatsHandle(ArcSwap<WriterStats>);

impl StatsHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(ArcSwap::from_pointee(WriterStats::default())))
    }

    pub fn snapshot(&self) -> Arc<WriterStats> {
        self.0.load_full()
    }

    pub fn update(&self, f: impl FnOnce(&mut WriterStats)) {
        let mut next = (**self.0.load()).clone();
        f(&mut next);
        self.0.store(Arc::new(next));
    }
}
