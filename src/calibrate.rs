//! # Calibration Engine
//!
//! Measures the fixed latency of the timer + notification path and stores
//! it as the compensation value subtracted from every armed delay.
//!
//! ## Procedure
//!
//! 1. Make sure the calling task owns its timer, so creation cost stays
//!    out of the measurement.
//! 2. Run `calibration_loops` reference delays of `calibration_us` through
//!    the timer path, with compensation forced to zero.
//! 3. Time each one against the clock and accumulate the overshoot
//!    `actual - requested`.
//! 4. Store the mean overshoot (integer division).
//!
//! Run it once, from one task, before relying on tight tolerances. An
//! uncalibrated engine behaves as if compensation were zero: the timer is
//! armed for the full request and every delay overshoots by the true
//! overhead.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::cache::timer_for_current_task;
use crate::delay::Delay;
use crate::error::CalibrateError;
use crate::port::Rtos;

/// Process-wide compensation used by engines built with `Delay::new`.
pub static COMPENSATION: Compensation = Compensation::new();

/// Shared compensation value in microseconds.
///
/// Plain load/store atomics only, so it works on cores without atomic
/// read-modify-write. The calibration flag is taken inside a critical
/// section for the same reason.
pub struct Compensation {
    value_us: AtomicU32,
    calibrating: AtomicBool,
}

impl Compensation {
    /// Uncalibrated: zero compensation, no calibration in progress.
    pub const fn new() -> Self {
        Self {
            value_us: AtomicU32::new(0),
            calibrating: AtomicBool::new(false),
        }
    }

    /// Current value in microseconds.
    #[inline]
    pub fn get(&self) -> u64 {
        self.value_us.load(Ordering::Acquire) as u64
    }

    /// Overwrite the value, clamped to `u32::MAX`.
    pub fn set(&self, us: u64) {
        let clamped = u32::try_from(us).unwrap_or(u32::MAX);
        self.value_us.store(clamped, Ordering::Release);
    }

    /// Back to zero, the uncalibrated value.
    pub fn reset(&self) {
        self.set(0);
    }

    fn begin_calibration(&self) -> Result<CalibrationGuard<'_>, CalibrateError> {
        let acquired = critical_section::with(|_| {
            if self.calibrating.load(Ordering::Relaxed) {
                return false;
            }
            self.calibrating.store(true, Ordering::Relaxed);
            true
        });

        if acquired {
            Ok(CalibrationGuard { owner: self })
        } else {
            Err(CalibrateError::Busy)
        }
    }
}

impl Default for Compensation {
    fn default() -> Self {
        Self::new()
    }
}

// Clears the in-progress flag on every exit path, including trial errors.
struct CalibrationGuard<'a> {
    owner: &'a Compensation,
}

impl Drop for CalibrationGuard<'_> {
    fn drop(&mut self) {
        self.owner.calibrating.store(false, Ordering::Release);
    }
}

impl<'c, R: Rtos> Delay<'c, R> {
    /// Measure the timer-path overhead and store it as the new compensation.
    ///
    /// Returns the stored value. On error the previous value is kept.
    ///
    /// # Errors
    /// - [`CalibrateError::NoTrials`] if `calibration_loops` is zero
    /// - [`CalibrateError::Busy`] if this compensation is already being
    ///   calibrated by another task
    /// - [`CalibrateError::Timer`] if a trial delay failed
    pub fn calibrate(&self) -> Result<u64, CalibrateError> {
        let loops = self.config.calibration_loops;
        if loops == 0 {
            return Err(CalibrateError::NoTrials);
        }
        let _guard = self.compensation.begin_calibration()?;

        // Create the task's timer up front so the first trial does not pay
        // for it
        timer_for_current_task(&self.rtos, self.config.tls_slot)?;

        let reference_us = self.config.calibration_us;
        let mut total_overshoot: u64 = 0;
        for trial in 0..loops {
            let start = self.rtos.now_us();
            self.timed_delay_compensated(reference_us, 0)?;
            let elapsed = self.rtos.now_us().saturating_sub(start);
            let overshoot = elapsed.saturating_sub(reference_us);
            log::trace!("microsleep: calibration trial {} overshoot {} us", trial, overshoot);
            total_overshoot = total_overshoot.saturating_add(overshoot);
        }

        self.compensation.set(total_overshoot / loops as u64);
        let stored = self.compensation.get();
        log::info!(
            "microsleep: calibrated {} x {} us, compensation {} us",
            loops,
            reference_us,
            stored
        );
        Ok(stored)
    }

    /// Current compensation in microseconds.
    pub fn compensation_us(&self) -> u64 {
        self.compensation.get()
    }

    /// Re-apply a previously measured compensation without running trials.
    pub fn set_compensation_us(&self, us: u64) {
        self.compensation.set(us);
    }

    /// Back to uncalibrated behavior.
    pub fn reset_compensation(&self) {
        self.compensation.reset();
    }
}
