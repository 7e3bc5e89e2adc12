//! Fence-bracketed reads of the CPU cycle counter.
//!
//! [`read_cycles`] issues a full ordering fence, reads the hardware counter and issues a
//! second full fence, so the instructions a caller wants to time cannot drift across the read.
//! The counter source is chosen at build time from the target architecture, see [`Backend`].
//!
//! Readings are raw ticks. They are only meaningful as differences taken on the same core,
//! and converting them to time is left to [`Calibration`].
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(test)]
#[macro_use]
extern crate approx;

mod calibration;
mod error;
#[cfg(feature = "std")]
mod mock;
#[cfg(feature = "std")]
mod monotonic;

#[cfg_attr(target_arch = "x86_64", path = "x86_64.rs")]
#[cfg_attr(all(target_arch = "x86", target_feature = "sse2"), path = "x86.rs")]
#[cfg_attr(target_arch = "aarch64", path = "aarch64.rs")]
#[cfg_attr(target_arch = "riscv64", path = "riscv64.rs")]
#[cfg_attr(
    not(any(
        target_arch = "x86_64",
        all(target_arch = "x86", target_feature = "sse2"),
        target_arch = "aarch64",
        target_arch = "riscv64"
    )),
    path = "fallback.rs"
)]
mod raw;

pub use calibration::{Calibration, DEFAULT_CALIBRATION_PERIOD};
pub use error::{CalibrationError, CalibrationResult};
#[cfg(feature = "std")]
pub use mock::{MockCounter, MockCounterControl};
#[cfg(feature = "std")]
pub use monotonic::read_monotonic_ticks;

use bincode::de::BorrowDecoder;
use bincode::de::Decoder;
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::BorrowDecode;
use bincode::{Decode, Encode};
use core::fmt::{Display, Formatter};
use core::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use serde::{Deserialize, Serialize};

/// Reads the cycle counter with a full fence immediately before and after the read.
///
/// Consecutive calls on the same core never go backwards. Nothing is written and nothing can
/// fail: on a target without a usable counter the crate does not build, or falls back to the
/// monotonic clock when `std` is available.
#[inline(always)]
#[must_use]
pub fn read_cycles() -> u64 {
    raw::read_raw_counter()
}

/// Reassembles a counter delivered as two 32 bit halves, as `rdtsc` does in EDX:EAX.
#[inline(always)]
pub const fn join_halves(high: u32, low: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

/// The counter source compiled into this build.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// `rdtsc` between two `mfence`.
    X86_64Tsc,
    /// Same as [`Backend::X86_64Tsc`] on 32 bit x86 with SSE2.
    X86Tsc,
    /// `cntvct_el0` between `dsb sy; isb` barriers. Ticks at the generic timer frequency,
    /// not the core clock.
    Aarch64VirtualCounter,
    /// `rdtime` between two `fence iorw, iorw`.
    Riscv64Time,
    /// Nanoseconds from the OS monotonic clock. Resolution depends on the OS.
    MonotonicFallback,
}

impl Backend {
    #[inline]
    pub const fn current() -> Self {
        raw::BACKEND
    }

    /// False when readings come from the OS clock instead of a CPU register.
    #[inline]
    pub const fn is_hardware(self) -> bool {
        !matches!(self, Backend::MonotonicFallback)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Backend::X86_64Tsc => "x86_64-tsc",
            Backend::X86Tsc => "x86-tsc",
            Backend::Aarch64VirtualCounter => "aarch64-cntvct",
            Backend::Riscv64Time => "riscv64-time",
            Backend::MonotonicFallback => "monotonic-fallback",
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw count of counter ticks. No unit conversion, no epoch.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Cycles(pub u64);

impl Cycles {
    pub const MIN: Cycles = Cycles(0u64);
    pub const MAX: Cycles = Cycles(u64::MAX);

    /// Reads the hardware counter, see [`read_cycles`].
    #[inline(always)]
    pub fn now() -> Self {
        Cycles(read_cycles())
    }

    #[inline]
    pub const fn as_u64(&self) -> u64 {
        let Self(ticks) = self;
        *ticks
    }

    pub fn max(self, other: Cycles) -> Cycles {
        let Self(lhs) = self;
        let Self(rhs) = other;
        Cycles(lhs.max(rhs))
    }

    pub fn min(self, other: Cycles) -> Cycles {
        let Self(lhs) = self;
        let Self(rhs) = other;
        Cycles(lhs.min(rhs))
    }

    #[inline]
    pub fn checked_sub(self, rhs: Cycles) -> Option<Cycles> {
        let Self(lhs) = self;
        let Self(rhs) = rhs;
        lhs.checked_sub(rhs).map(Cycles)
    }

    #[inline]
    pub fn saturating_sub(self, rhs: Cycles) -> Cycles {
        let Self(lhs) = self;
        let Self(rhs) = rhs;
        Cycles(lhs.saturating_sub(rhs))
    }

    /// Ticks between `earlier` and `self`, or zero if `earlier` is ahead
    /// (for example after a migration to a core with a lagging counter).
    #[inline]
    pub fn elapsed_since(self, earlier: Cycles) -> Cycles {
        self.saturating_sub(earlier)
    }
}

impl From<u64> for Cycles {
    fn from(ticks: u64) -> Self {
        Cycles(ticks)
    }
}

impl From<Cycles> for u64 {
    fn from(val: Cycles) -> Self {
        let Cycles(ticks) = val;
        ticks
    }
}

impl Sub for Cycles {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        let Cycles(lhs) = self;
        let Cycles(rhs) = rhs;
        Cycles(lhs - rhs)
    }
}

impl Add for Cycles {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        let Cycles(lhs) = self;
        let Cycles(rhs) = rhs;
        Cycles(lhs + rhs)
    }
}

impl AddAssign for Cycles {
    fn add_assign(&mut self, rhs: Self) {
        let Cycles(lhs) = self;
        let Cycles(rhs) = rhs;
        *lhs += rhs;
    }
}

impl SubAssign for Cycles {
    fn sub_assign(&mut self, rhs: Self) {
        let Cycles(lhs) = self;
        let Cycles(rhs) = rhs;
        *lhs -= rhs;
    }
}

// per iteration cost of a loop for example.
impl<T> Div<T> for Cycles
where
    T: Into<u64>,
{
    type Output = Self;
    fn div(self, rhs: T) -> Self {
        let Cycles(lhs) = self;
        Cycles(lhs / rhs.into())
    }
}

impl<T> Mul<T> for Cycles
where
    T: Into<u64>,
{
    type Output = Cycles;

    fn mul(self, rhs: T) -> Cycles {
        let Cycles(lhs) = self;
        Cycles(lhs * rhs.into())
    }
}

impl Mul<Cycles> for u64 {
    type Output = Cycles;

    fn mul(self, rhs: Cycles) -> Cycles {
        let Cycles(ticks) = rhs;
        Cycles(self * ticks)
    }
}

impl Encode for Cycles {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        let Cycles(ticks) = self;
        ticks.encode(encoder)
    }
}

impl<Context> Decode<Context> for Cycles {
    fn decode<D: Decoder>(decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(Cycles(u64::decode(decoder)?))
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Cycles {
    fn borrow_decode<D: BorrowDecoder<'de>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(Cycles(u64::decode(decoder)?))
    }
}

impl Display for Cycles {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let Self(ticks) = *self;
        if ticks >= 1_000_000_000_000 {
            write!(f, "{:.3} Tcy", ticks as f64 / 1_000_000_000_000.0)
        } else if ticks >= 1_000_000_000 {
            write!(f, "{:.3} Gcy", ticks as f64 / 1_000_000_000.0)
        } else if ticks >= 1_000_000 {
            write!(f, "{:.3} Mcy", ticks as f64 / 1_000_000.0)
        } else if ticks >= 1_000 {
            write!(f, "{:.3} Kcy", ticks as f64 / 1_000.0)
        } else {
            write!(f, "{ticks} cy")
        }
    }
}

/// Anything that can hand out counter readings.
/// Code that times itself should take one of these so tests can drive it with a [`MockCounter`].
pub trait CycleCounter {
    fn now_cycles(&self) -> u64;

    #[inline]
    fn now(&self) -> Cycles {
        Cycles(self.now_cycles())
    }
}

impl<C: CycleCounter + ?Sized> CycleCounter for &C {
    #[inline]
    fn now_cycles(&self) -> u64 {
        (**self).now_cycles()
    }
}

/// The counter of the CPU running the calling thread.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HardwareCounter;

impl HardwareCounter {
    pub const fn new() -> Self {
        HardwareCounter
    }

    pub const fn backend(&self) -> Backend {
        Backend::current()
    }
}

impl CycleCounter for HardwareCounter {
    #[inline(always)]
    fn now_cycles(&self) -> u64 {
        read_cycles()
    }
}

/// Runs `f` between two reads of `counter` and returns the elapsed ticks with its result.
#[inline]
pub fn measure<C, F, R>(counter: &C, f: F) -> (Cycles, R)
where
    C: CycleCounter + ?Sized,
    F: FnOnce() -> R,
{
    let start = counter.now();
    let result = f();
    let end = counter.now();
    (end.elapsed_since(start), result)
}
