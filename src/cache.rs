//! # Per-Task Timer Cache
//!
//! Each task that issues a timer-backed delay gets exactly one one-shot
//! timer, created on its first delay and kept in a task-local storage slot.
//! The slot is registered with a destructor so the RTOS releases the timer
//! when the task is deleted; the delay engine never frees it itself.
//!
//! Slots are private to their task, so lookup and creation need no locking.

use crate::error::TimerError;
use crate::notify::on_timer_expiry;
use crate::port::Rtos;

/// Return the calling task's timer, creating and registering it on first use.
///
/// The timer's expiry callback is [`on_timer_expiry`] bound to the calling
/// task. Subsequent calls from the same task return the cached handle.
pub fn timer_for_current_task<R: Rtos>(rtos: &R, slot: usize) -> Result<R::Timer, TimerError> {
    if let Some(timer) = rtos.tls_get(slot) {
        return Ok(timer);
    }

    let task = rtos.current_task();
    let timer = rtos.timer_create(on_timer_expiry::<R>, task)?;
    rtos.tls_set_with_destructor(slot, timer, release_timer::<R>);
    log::debug!("microsleep: created one-shot timer {:?} for task {:?}", timer, task);
    Ok(timer)
}

/// Slot destructor: runs when the owning task is deleted.
fn release_timer<R: Rtos>(rtos: &R, timer: R::Timer) {
    rtos.timer_delete(timer);
}
