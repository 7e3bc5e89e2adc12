use crate::Backend;

pub const BACKEND: Backend = Backend::MonotonicFallback;

/// Fallback implementation for architectures without a user-readable counter.
/// Ticks are nanoseconds since the first read in this process, so the resolution is
/// whatever the OS monotonic clock offers rather than a CPU cycle.
#[cfg(feature = "std")]
#[inline(always)]
pub fn read_raw_counter() -> u64 {
    crate::monotonic::read_monotonic_ticks()
}

#[cfg(not(feature = "std"))]
compile_error!(
    "cycle-clock: no cycle counter for this target architecture; enable the `std` feature to use the monotonic clock fallback"
);
