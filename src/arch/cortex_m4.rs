//! # Cortex-M4 Port Layer
//!
//! Clock and yield primitives for an RTOS port on ARM Cortex-M4.
//!
//! ## Microsecond clock
//!
//! The DWT cycle counter (`CYCCNT`) runs at the core clock and wraps every
//! 2^32 cycles (about 26 s at 160 MHz). [`CycleClock`] extends it to 64
//! bits by counting wraps, so it must be read at least once per wrap period.
//! Any task calling the delay engine does that as a side effect; an idle
//! system should read it from the tick hook.
//!
//! ## Yield
//!
//! [`pend_yield`] pends PendSV, the standard Cortex-M deferred context
//! switch. It is safe from both thread and handler mode and is what
//! `Rtos::yield_now` / `Rtos::request_reschedule` map to on most kernels.

use core::cell::Cell;

use critical_section::Mutex;

#[cfg(target_arch = "arm")]
use crate::port::Clock;

#[derive(Debug, Clone, Copy)]
struct WrapState {
    last: u32,
    wraps: u32,
}

/// Monotonic microsecond clock derived from the DWT cycle counter.
pub struct CycleClock {
    cycles_per_us: u32,
    state: Mutex<Cell<WrapState>>,
}

impl CycleClock {
    /// `sysclk_hz` is the core clock driving `CYCCNT`. Must be at least 1 MHz.
    pub const fn new(sysclk_hz: u32) -> Self {
        let cycles_per_us = sysclk_hz / 1_000_000;
        Self {
            cycles_per_us: if cycles_per_us == 0 { 1 } else { cycles_per_us },
            state: Mutex::new(Cell::new(WrapState { last: 0, wraps: 0 })),
        }
    }

    /// Fold a raw 32-bit counter sample into the extended time line and
    /// return it in microseconds.
    pub fn extend(&self, cycles: u32) -> u64 {
        let total = critical_section::with(|cs| {
            let cell = self.state.borrow(cs);
            let mut state = cell.get();
            if cycles < state.last {
                state.wraps = state.wraps.wrapping_add(1);
            }
            state.last = cycles;
            cell.set(state);
            ((state.wraps as u64) << 32) | cycles as u64
        });
        total / self.cycles_per_us as u64
    }
}

#[cfg(target_arch = "arm")]
impl Clock for CycleClock {
    fn now_us(&self) -> u64 {
        self.extend(cortex_m::peripheral::DWT::cycle_count())
    }
}

/// Start `CYCCNT`. Call once during board bring-up, before the first delay.
#[cfg(target_arch = "arm")]
pub fn enable_cycle_counter(
    dcb: &mut cortex_m::peripheral::DCB,
    dwt: &mut cortex_m::peripheral::DWT,
) {
    dcb.enable_trace();
    dwt.enable_cycle_counter();
}

/// Pend a PendSV exception so the kernel reschedules on exception exit.
#[cfg(target_arch = "arm")]
#[inline]
pub fn pend_yield() {
    cortex_m::peripheral::SCB::set_pendsv();
}
