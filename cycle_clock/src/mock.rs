use crate::{CycleCounter, Cycles};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A counter that only moves when told to.
/// It is clone resilient, ie a clone reads the same value as the original.
#[derive(Clone, Debug)]
pub struct MockCounter(Arc<AtomicU64>);

/// The controlling side of a [`MockCounter`].
#[derive(Clone, Debug)]
pub struct MockCounterControl(Arc<AtomicU64>);

impl MockCounter {
    /// Builds a counter starting at 0 and the handle that drives it.
    pub fn mock() -> (Self, MockCounterControl) {
        let ticks = Arc::new(AtomicU64::new(0));
        (MockCounter(Arc::clone(&ticks)), MockCounterControl(ticks))
    }
}

impl CycleCounter for MockCounter {
    #[inline]
    fn now_cycles(&self) -> u64 {
        let Self(ticks) = self;
        ticks.load(Ordering::SeqCst)
    }
}

impl MockCounterControl {
    pub fn increment(&self, amount: u64) {
        let Self(ticks) = self;
        ticks.fetch_add(amount, Ordering::SeqCst);
    }

    /// Moves the counter back, stopping at 0.
    /// Be careful this breaks the monotonicity of the counter.
    pub fn decrement(&self, amount: u64) {
        let Self(ticks) = self;
        let _ = ticks.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
            Some(v.saturating_sub(amount))
        });
    }

    pub fn value(&self) -> u64 {
        let Self(ticks) = self;
        ticks.load(Ordering::SeqCst)
    }

    /// A convenient way to get the current reading from the mocking side.
    pub fn now(&self) -> Cycles {
        Cycles(self.value())
    }

    pub fn set_value(&self, value: u64) {
        let Self(ticks) = self;
        ticks.store(value, Ordering::SeqCst);
    }
}
