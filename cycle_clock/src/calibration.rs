use crate::error::{CalibrationError, CalibrationResult};
use crate::{CycleCounter, Cycles};
use bincode::{Decode, Encode};
use core::time::Duration;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: u128 = 1_000_000_000;

pub const DEFAULT_CALIBRATION_PERIOD: Duration = Duration::from_millis(10);

/// Frequency estimate of a cycle counter against a reference clock in nanoseconds.
///
/// It also remembers one (counter, reference) pair taken at the same instant so absolute
/// readings can be placed on the reference timeline with [`Calibration::reading_to_nanos`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct Calibration {
    ticks_per_second: u64,
    origin_ticks: u64,
    origin_ns: u64,
}

impl Calibration {
    /// Calibrates `counter` against a reference clock.
    ///
    /// Both sources are sampled, `sleep_ns(period_ns)` is called, then both are sampled again.
    /// The frequency is the ratio of the two deltas.
    pub fn measure<C, R, S>(
        counter: &C,
        read_reference_ns: R,
        sleep_ns: S,
        period_ns: u64,
    ) -> CalibrationResult<Self>
    where
        C: CycleCounter + ?Sized,
        R: Fn() -> u64,
        S: Fn(u64),
    {
        if period_ns == 0 {
            return Err(CalibrationError::ZeroPeriod);
        }

        let start_ticks = counter.now_cycles();
        let start_ns = read_reference_ns();

        sleep_ns(period_ns);

        let end_ticks = counter.now_cycles();
        let end_ns = read_reference_ns();
        trace!(
            "calibration samples: ticks {start_ticks}..{end_ticks}, reference {start_ns}..{end_ns}ns"
        );

        let tick_diff = end_ticks.saturating_sub(start_ticks);
        let time_diff_ns = end_ns.saturating_sub(start_ns);

        if time_diff_ns == 0 {
            return Err(CalibrationError::ReferenceStalled { period_ns });
        }
        if tick_diff == 0 {
            return Err(CalibrationError::CounterStalled { period_ns });
        }

        let freq = (u128::from(tick_diff) * NANOS_PER_SEC) / u128::from(time_diff_ns);
        let ticks_per_second = u64::try_from(freq).unwrap_or(u64::MAX);
        if ticks_per_second == 0 {
            return Err(CalibrationError::ZeroFrequency);
        }

        debug!("cycle counter calibrated at {ticks_per_second} ticks/s over {time_diff_ns}ns");
        Ok(Calibration {
            ticks_per_second,
            origin_ticks: start_ticks,
            origin_ns: start_ns,
        })
    }

    /// Calibrates `counter` against the OS monotonic clock, sleeping the thread for `period`.
    /// The reference timeline starts when this function is called.
    #[cfg(feature = "std")]
    pub fn against_monotonic_clock<C>(counter: &C, period: Duration) -> CalibrationResult<Self>
    where
        C: CycleCounter + ?Sized,
    {
        let reference = std::time::Instant::now();
        Self::measure(
            counter,
            || u64::try_from(reference.elapsed().as_nanos()).unwrap_or(u64::MAX),
            |ns| std::thread::sleep(Duration::from_nanos(ns)),
            u64::try_from(period.as_nanos()).unwrap_or(u64::MAX),
        )
    }

    /// For counters with a documented frequency, like `cntfrq_el0` on aarch64.
    pub fn from_frequency(ticks_per_second: u64) -> CalibrationResult<Self> {
        if ticks_per_second == 0 {
            return Err(CalibrationError::ZeroFrequency);
        }
        Ok(Calibration {
            ticks_per_second,
            origin_ticks: 0,
            origin_ns: 0,
        })
    }

    #[inline]
    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    pub fn cycles_to_nanos(&self, cycles: Cycles) -> u64 {
        let Cycles(ticks) = cycles;
        (u128::from(ticks) * NANOS_PER_SEC)
            .checked_div(u128::from(self.ticks_per_second))
            .map_or(u64::MAX, |nanos| u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn nanos_to_cycles(&self, nanos: u64) -> Cycles {
        let ticks = (u128::from(nanos) * u128::from(self.ticks_per_second)) / NANOS_PER_SEC;
        Cycles(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    pub fn to_duration(&self, cycles: Cycles) -> Duration {
        Duration::from_nanos(self.cycles_to_nanos(cycles))
    }

    /// Translates an absolute reading into nanoseconds on the reference clock.
    /// Readings older than the calibration origin map to the origin.
    pub fn reading_to_nanos(&self, reading: Cycles) -> u64 {
        let since_origin = reading.saturating_sub(Cycles(self.origin_ticks));
        self.origin_ns.saturating_add(self.cycles_to_nanos(since_origin))
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::{HardwareCounter, MockCounter};
    use std::cell::Cell;

    #[test]
    fn test_measure_with_mock_counter() {
        let (counter, mock) = MockCounter::mock();
        mock.set_value(5_000);
        let reference_ns = Cell::new(1_000u64);

        // a 3 GHz counter
        let calibration = Calibration::measure(
            &counter,
            || reference_ns.get(),
            |ns| {
                mock.increment(ns * 3);
                reference_ns.set(reference_ns.get() + ns);
            },
            10_000_000,
        )
        .expect("calibration failed");

        assert_eq!(calibration.ticks_per_second(), 3_000_000_000);
        assert_eq!(calibration.cycles_to_nanos(Cycles(3_000)), 1_000);
        assert_eq!(calibration.nanos_to_cycles(1_000), Cycles(3_000));
        assert_eq!(
            calibration.to_duration(Cycles(3_000_000_000)),
            Duration::from_secs(1)
        );
        // origin was (5_000 ticks, 1_000ns)
        assert_eq!(calibration.reading_to_nanos(Cycles(5_000)), 1_000);
        assert_eq!(calibration.reading_to_nanos(Cycles(8_000)), 2_000);
        assert_eq!(calibration.reading_to_nanos(Cycles(0)), 1_000);
    }

    #[test]
    fn test_measure_rejects_zero_period() {
        let (counter, _mock) = MockCounter::mock();
        assert_eq!(
            Calibration::measure(&counter, || 0, |_| {}, 0),
            Err(CalibrationError::ZeroPeriod)
        );
    }

    #[test]
    fn test_measure_detects_stalled_reference() {
        let (counter, mock) = MockCounter::mock();
        let result = Calibration::measure(&counter, || 42, |ns| mock.increment(ns), 1_000);
        assert_eq!(
            result,
            Err(CalibrationError::ReferenceStalled { period_ns: 1_000 })
        );
    }

    #[test]
    fn test_measure_detects_stalled_counter() {
        let (counter, _mock) = MockCounter::mock();
        let reference_ns = Cell::new(0u64);
        let result = Calibration::measure(
            &counter,
            || reference_ns.get(),
            |ns| reference_ns.set(reference_ns.get() + ns),
            1_000,
        );
        assert_eq!(
            result,
            Err(CalibrationError::CounterStalled { period_ns: 1_000 })
        );
    }

    #[test]
    fn test_measure_detects_sub_hertz_counter() {
        let (counter, mock) = MockCounter::mock();
        let reference_ns = Cell::new(0u64);
        // one tick over ten seconds
        let result = Calibration::measure(
            &counter,
            || reference_ns.get(),
            |ns| {
                mock.increment(1);
                reference_ns.set(reference_ns.get() + ns);
            },
            10_000_000_000,
        );
        assert_eq!(result, Err(CalibrationError::ZeroFrequency));
    }

    #[test]
    fn test_from_frequency() {
        assert_eq!(
            Calibration::from_frequency(0),
            Err(CalibrationError::ZeroFrequency)
        );
        let calibration = Calibration::from_frequency(24_000_000).expect("valid frequency");
        assert_eq!(calibration.cycles_to_nanos(Cycles(24)), 1_000);
        assert_eq!(calibration.reading_to_nanos(Cycles(24_000_000)), 1_000_000_000);
    }

    #[test]
    fn test_conversions_saturate() {
        let calibration = Calibration::from_frequency(1).expect("valid frequency");
        assert_eq!(calibration.cycles_to_nanos(Cycles::MAX), u64::MAX);
        let fast = Calibration::from_frequency(u64::MAX).expect("valid frequency");
        assert_eq!(fast.nanos_to_cycles(u64::MAX), Cycles::MAX);
    }

    #[test]
    fn test_against_monotonic_clock() {
        let calibration = Calibration::against_monotonic_clock(
            &HardwareCounter::new(),
            DEFAULT_CALIBRATION_PERIOD,
        )
        .expect("calibration against the monotonic clock failed");
        assert!(calibration.ticks_per_second() > 0);

        // converting back and forth only loses rounding
        let nanos = 50_000_000u64;
        let back = calibration.cycles_to_nanos(calibration.nanos_to_cycles(nanos));
        assert_relative_eq!(back as f64, nanos as f64, max_relative = 0.01);
    }

    #[test]
    fn test_calibration_bincode_roundtrip() {
        let config = bincode::config::standard();
        let calibration = Calibration::from_frequency(3_000_000_000).expect("valid frequency");
        let mut buf = [0u8; 64];

        let written = bincode::encode_into_slice(calibration, &mut buf, config)
            .expect("Failed to encode Calibration");
        let (decoded, read): (Calibration, usize) =
            bincode::decode_from_slice(&buf[..written], config)
                .expect("Failed to decode Calibration");
        assert_eq!(decoded, calibration);
        assert_eq!(read, written);
    }

    #[test]
    fn test_decoded_zero_frequency_saturates() {
        let config = bincode::config::standard();
        let mut buf = [0u8; 64];
        // same field layout as Calibration: ticks_per_second, origin_ticks, origin_ns
        let written = bincode::encode_into_slice((0u64, 0u64, 0u64), &mut buf, config)
            .expect("Failed to encode fields");
        let (broken, _): (Calibration, usize) =
            bincode::decode_from_slice(&buf[..written], config)
                .expect("Failed to decode Calibration");

        assert_eq!(broken.ticks_per_second(), 0);
        assert_eq!(broken.cycles_to_nanos(Cycles(10)), u64::MAX);
        assert_eq!(broken.nanos_to_cycles(10), Cycles(0));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CalibrationError::CounterStalled { period_ns: 10 }.to_string(),
            "Cycle counter did not advance during the 10ns calibration window"
        );
        assert_eq!(
            CalibrationError::ZeroPeriod.to_string(),
            "Calibration period must be longer than 0ns"
        );
    }
}
