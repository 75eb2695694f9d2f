//! # microsleep — microsecond delays for RTOS tasks
//!
//! Scheduler delay primitives are quantized to the tick period (typically
//! 1 ms). Busy-waiting instead burns the CPU, starves lower-priority tasks
//! and trips watchdogs. `microsleep` picks the cheapest correct strategy for
//! each request:
//!
//! - **Busy-wait with yield** for waits shorter than the timer path's own
//!   overhead.
//! - **One-shot timer + task notification** for everything else: the task
//!   blocks, a per-task cached hardware timer wakes exactly that task.
//! - **Tick sleep** in the simple variant, for waits of a millisecond or more.
//!
//! A calibration run measures the fixed dispatch/wake latency of the timer
//! path and subtracts it from every armed delay.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Application Tasks                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   Delay Engine (delay.rs)                   │
//! │       delay() · timed_delay() · calibrate() · DelayNs       │
//! ├──────────────┬───────────────┬──────────────┬───────────────┤
//! │  Busy-Wait   │  Timer Cache  │  Notify-Wake │  Calibrate    │
//! │  busy.rs     │  cache.rs     │  notify.rs   │  calibrate.rs │
//! ├──────────────┴───────────────┴──────────────┴───────────────┤
//! │                    Port trait (port.rs)                     │
//! │   clock · yield · ticks · one-shot timers · TLS · notify    │
//! ├─────────────────────────────────────────────────────────────┤
//! │      Ports (arch/): Cortex-M4 clock + yield · std host      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let delay = microsleep::Delay::new(MyRtos);
//! delay.calibrate()?;          // once, from one task, at startup
//! delay.timed_delay(150)?;     // 150 us, blocking only this task
//! delay.delay(5_000);          // simple variant: 5 ticks
//! ```
//!
//! ## Memory Model
//!
//! - **No heap** in the engine; `no_std` unless the `std` feature is on
//! - **One timer per task**, owned by a task-local slot and released by the
//!   RTOS when the task is deleted
//! - **Compensation** is a load/store atomic; calibration is single-writer

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod arch;
pub mod busy;
pub mod cache;
pub mod calibrate;
pub mod config;
pub mod delay;
pub mod error;
pub mod notify;
pub mod port;

#[cfg(test)]
mod test_utils;

pub use busy::busy_wait;
pub use cache::timer_for_current_task;
pub use calibrate::{Compensation, COMPENSATION};
pub use config::Config;
pub use delay::Delay;
pub use error::{CalibrateError, TimerError};
pub use notify::on_timer_expiry;
pub use port::{Clock, Rtos};
