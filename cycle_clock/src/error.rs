use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("Calibration period must be longer than 0ns")]
    ZeroPeriod,

    #[error("Reference clock did not advance during the {period_ns}ns calibration window")]
    ReferenceStalled { period_ns: u64 },

    #[error("Cycle counter did not advance during the {period_ns}ns calibration window")]
    CounterStalled { period_ns: u64 },

    #[error("Counter frequency must be at least 1 tick per second")]
    ZeroFrequency,
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
