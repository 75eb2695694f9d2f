//! Error types returned by the timer-backed delay path and by calibration.

use core::fmt;

/// Failure reported by the RTOS one-shot timer subsystem.
///
/// Returned to the caller of `timed_delay` unmodified. A failed call has not
/// delayed (or only partially, if arming failed after creation), so callers
/// should treat it as "delay did not occur".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// No one-shot timer could be allocated for the calling task.
    Create,
    /// The cached timer exists but could not be started.
    Arm,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::Create => write!(f, "one-shot timer creation failed"),
            TimerError::Arm => write!(f, "one-shot timer could not be armed"),
        }
    }
}

/// Failure of a calibration run. The stored compensation is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrateError {
    /// A trial delay failed in the timer subsystem.
    Timer(TimerError),
    /// Another task is calibrating the same compensation value.
    Busy,
    /// The configuration asks for zero trials.
    NoTrials,
}

impl From<TimerError> for CalibrateError {
    fn from(err: TimerError) -> Self {
        CalibrateError::Timer(err)
    }
}

impl fmt::Display for CalibrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrateError::Timer(err) => write!(f, "calibration trial failed: {}", err),
            CalibrateError::Busy => write!(f, "calibration already in progress"),
            CalibrateError::NoTrials => write!(f, "calibration needs at least one trial"),
        }
    }
}
