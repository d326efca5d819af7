use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounds how many tasks run at once.
///
/// `acquire` is unconditional: the caller is expected to have checked
/// admission first. `try_acquire` folds the check and the increment into one
/// atomic step, which is what concurrent attempts must use.
#[derive(Debug)]
pub struct SlotManager {
    running: AtomicUsize,
    max_slots: usize,
}

impl SlotManager {
    pub fn new(max_slots: usize) -> Self {
        Self {
            running: AtomicUsize::new(0),
            max_slots: max_slots.max(1),
        }
    }

    pub fn acquire(&self) {
        self.running.fetch_add(1, Ordering::SeqCst);
    }

    pub fn try_acquire(&self) -> bool {
        self.running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_slots).then_some(n + 1)
            })
            .is_ok()
    }

    /// Floored at zero, so extra releases are harmless.
    pub fn release(&self) {
        let _ = self
            .running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn available_slots(&self) -> usize {
        self.max_slots.saturating_sub(self.running_count())
    }

    pub fn is_full(&self) -> bool {
        self.running_count() >= self.max_slots
    }
}

/// A held slot, released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    slots: Arc<SlotManager>,
}

impl SlotGuard {
    pub fn try_acquire(slots: &Arc<SlotManager>) -> Option<Self> {
        slots.try_acquire().then(|| Self {
            slots: Arc::clone(slots),
        })
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.release();
    }
}
