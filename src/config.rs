//! # Configuration
//!
//! Compile-time defaults for the delay engine. Every value can be overridden
//! per engine through [`Config`] and `Delay::with_config`.

/// Requests shorter than this many microseconds take the busy-wait path in
/// the simple (uncalibrated) variant. Longer requests sleep whole ticks.
pub const BUSY_WAIT_THRESHOLD_US: u64 = 1000;

/// Number of reference delays timed by one calibration run.
pub const CALIBRATION_LOOPS: u32 = 10;

/// Length of each calibration reference delay in microseconds.
/// Short enough to finish quickly, long enough to always take the timer path.
pub const CALIBRATION_US: u64 = 100;

/// Task-local storage slot reserved for the cached one-shot timer.
/// Must not collide with slots used by the application or other drivers.
pub const TIMER_TLS_SLOT: usize = 1;

/// Extra time granted to the notification wait beyond the armed timer
/// period. If the wake never arrives the wait ends after
/// `armed + WAIT_SLACK_US` and the delay completes anyway.
pub const WAIT_SLACK_US: u64 = 2000;

/// Runtime configuration of a delay engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Threshold between busy-wait and tick sleep in `Delay::delay`.
    pub busy_threshold_us: u64,

    /// Calibration trials per run. Zero is rejected by `calibrate`.
    pub calibration_loops: u32,

    /// Requested duration of each calibration trial.
    pub calibration_us: u64,

    /// Timeout margin added to every notification wait.
    pub wait_slack_us: u64,

    /// Task-local slot holding the cached timer.
    pub tls_slot: usize,
}

impl Config {
    pub const DEFAULT: Self = Self {
        busy_threshold_us: BUSY_WAIT_THRESHOLD_US,
        calibration_loops: CALIBRATION_LOOPS,
        calibration_us: CALIBRATION_US,
        wait_slack_us: WAIT_SLACK_US,
        tls_slot: TIMER_TLS_SLOT,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}
