//! Notify-wake: hands a timer expiry over to the task waiting on it.
//!
//! The timer subsystem calls [`on_timer_expiry`] with the task identity the
//! timer was created for. Only that task is notified, so concurrent delays
//! in other tasks never see each other's wakeups.

use crate::port::Rtos;

/// Expiry callback registered with every cached timer.
///
/// Must not block: it may run on the timer service task or in an
/// elevated-priority context.
pub fn on_timer_expiry<R: Rtos>(rtos: &R, task: R::TaskId) {
    if rtos.notify_from_callback(task) {
        rtos.request_reschedule();
    }
}
