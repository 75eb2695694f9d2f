//! # Adaptive Delay Engine
//!
//! Public entry point. Two policies are offered side by side:
//!
//! - [`Delay::delay`]: busy-wait below the busy threshold, otherwise sleep
//!   whole scheduler ticks. Infallible, no timer involved.
//! - [`Delay::timed_delay`]: microsecond-accurate. Waits at or below the
//!   measured timer overhead are busy-waited; longer ones arm the task's
//!   cached one-shot timer for `duration - compensation` and block on the
//!   task notification.
//!
//! ## Path selection
//!
//! ```text
//!  delay(d)                      timed_delay(d)
//!    │                             │
//!    ├─ d < busy threshold          ├─ cached timer (create on first use)
//!    │    └─► busy_wait(d)          ├─ d == 0          └─► return
//!    │                              ├─ d <= comp       └─► busy_wait(d)
//!    └─ else                        └─ else
//!         └─► sleep_ticks(d / tick)      ├─► notify_clear()
//!                                        ├─► start_once(d - comp)
//!                                        └─► notify_wait(d - comp + slack)
//! ```
//!
//! Tick sleeps truncate: with a 1000 us tick, `delay(1999)` sleeps exactly
//! one tick, the same as `delay(1000)`. The [`DelayNs`] fallback rounds up
//! instead, since that trait promises at least the requested time.

use embedded_hal::delay::DelayNs;

use crate::busy::busy_wait;
use crate::cache::timer_for_current_task;
use crate::calibrate::{Compensation, COMPENSATION};
use crate::config::Config;
use crate::error::TimerError;
use crate::port::Rtos;

/// Microsecond delay engine bound to an RTOS port.
///
/// The engine itself is stateless apart from its configuration: timers live
/// in task-local storage and the compensation value is shared. One engine
/// can therefore be shared by every task.
pub struct Delay<'c, R: Rtos> {
    pub(crate) rtos: R,
    pub(crate) config: Config,
    pub(crate) compensation: &'c Compensation,
}

impl<R: Rtos> Delay<'static, R> {
    /// Engine using the default configuration and the process-wide
    /// compensation value.
    pub fn new(rtos: R) -> Self {
        Self::with_config(rtos, Config::DEFAULT)
    }

    pub fn with_config(rtos: R, config: Config) -> Self {
        Self {
            rtos,
            config,
            compensation: &COMPENSATION,
        }
    }
}

impl<'c, R: Rtos> Delay<'c, R> {
    /// Engine bound to a private compensation value instead of the
    /// process-wide one.
    pub fn with_compensation(rtos: R, config: Config, compensation: &'c Compensation) -> Self {
        Self {
            rtos,
            config,
            compensation,
        }
    }

    pub fn rtos(&self) -> &R {
        &self.rtos
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Simple delay: busy-wait short requests, tick-sleep long ones.
    ///
    /// Requests of at least the busy threshold sleep
    /// `duration_us / R::TICK_PERIOD_US` whole ticks, rounding down.
    pub fn delay(&self, duration_us: u64) {
        if duration_us < self.config.busy_threshold_us {
            busy_wait(&self.rtos, duration_us);
        } else {
            let ticks = duration_us / R::TICK_PERIOD_US;
            self.rtos.sleep_ticks(u32::try_from(ticks).unwrap_or(u32::MAX));
        }
    }

    /// Calibrated delay through the task's one-shot timer.
    ///
    /// # Errors
    /// [`TimerError::Create`] if the task has no timer yet and none could be
    /// allocated, [`TimerError::Arm`] if the timer could not be started. In
    /// both cases the delay has not (fully) happened.
    pub fn timed_delay(&self, duration_us: u64) -> Result<(), TimerError> {
        self.timed_delay_compensated(duration_us, self.compensation.get())
    }

    pub(crate) fn timed_delay_compensated(
        &self,
        duration_us: u64,
        compensation_us: u64,
    ) -> Result<(), TimerError> {
        let timer = timer_for_current_task(&self.rtos, self.config.tls_slot)?;

        if duration_us == 0 {
            return Ok(());
        }

        if duration_us <= compensation_us {
            // Timer overhead alone would overshoot
            busy_wait(&self.rtos, duration_us);
            return Ok(());
        }

        let armed_us = duration_us - compensation_us;
        // A wake that arrived after an earlier wait timed out would end this
        // wait immediately
        self.rtos.notify_clear();
        self.rtos.timer_start_once(timer, armed_us)?;

        let timeout_us = armed_us.saturating_add(self.config.wait_slack_us);
        if !self.rtos.notify_wait(timeout_us) {
            log::warn!(
                "microsleep: no wake after {} us (armed {} us), completing on timeout",
                timeout_us,
                armed_us
            );
        }
        Ok(())
    }

    // Timer path first; without a timer, never return before `duration_us`.
    fn delay_at_least(&self, duration_us: u64) {
        if self.timed_delay(duration_us).is_ok() {
            return;
        }
        if duration_us < self.config.busy_threshold_us {
            busy_wait(&self.rtos, duration_us);
        } else {
            let ticks = duration_us.div_ceil(R::TICK_PERIOD_US);
            self.rtos.sleep_ticks(u32::try_from(ticks).unwrap_or(u32::MAX));
        }
    }
}

impl<R: Rtos> DelayNs for Delay<'_, R> {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_at_least((ns as u64).div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_at_least(us as u64);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_at_least(ms as u64 * 1000);
    }
}
