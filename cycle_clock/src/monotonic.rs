use core::sync::atomic::{fence, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds from the OS monotonic clock since the first call in this process, bracketed by
/// `SeqCst` fences like the hardware reads.
///
/// This is what [`crate::read_cycles`] returns on targets without a user-readable counter.
/// It is available on every target with `std` so callers can compare both sources.
#[inline]
pub fn read_monotonic_ticks() -> u64 {
    let origin = *ORIGIN.get_or_init(Instant::now);

    fence(Ordering::SeqCst);
    let ticks = u64::try_from(origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
    fence(Ordering::SeqCst);
    ticks
}
