//! Busy-wait path: poll the clock and yield until the target time.
//!
//! Only used for short waits (below the busy threshold, or below the
//! measured timer overhead). The task stays runnable, so equal-priority
//! tasks still get the processor and the watchdog keeps being fed.

use crate::port::Rtos;

/// Spin for at least `duration_us` microseconds, yielding every iteration.
pub fn busy_wait<R: Rtos>(rtos: &R, duration_us: u64) {
    let target = rtos.now_us().saturating_add(duration_us);
    while rtos.now_us() < target {
        rtos.yield_now();
    }
}
