use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide bridge counters.
///
/// This is the only state shared between connection pairs.
#[derive(Debug, Default)]
pub struct BridgeStats {
    pairs_opened: AtomicU64,
    pairs_closed: AtomicU64,
    frames_to_backend: AtomicU64,
    frames_to_client: AtomicU64,
    backend_connect_failures: AtomicU64,
}

/// Point-in-time copy of [`BridgeStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub pairs_opened: u64,
    pub pairs_active: u64,
    pub pairs_closed: u64,
    pub frames_to_backend: u64,
    pub frames_to_client: u64,
    pub backend_connect_failures: u64,
}

impl BridgeStats {
    pub(crate) fn pair_opened(&self) {
        self.pairs_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn pair_closed(&self) {
        self.pairs_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_to_backend(&self) {
        self.frames_to_backend.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_to_client(&self) {
        self.frames_to_client.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn backend_connect_failed(&self) {
        self.backend_connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let opened = self.pairs_opened.load(Ordering::Relaxed);
        let closed = self.pairs_closed.load(Ordering::Relaxed);
        StatsSnapshot {
            pairs_opened: opened,
            pairs_active: opened.saturating_sub(closed),
            pairs_closed: closed,
            frames_to_backend: self.frames_to_backend.load(Ordering::Relaxed),
            frames_to_client: self.frames_to_client.load(Ordering::Relaxed),
            backend_connect_failures: self.backend_connect_failures.load(Ordering::Relaxed),
        }
    }
}
