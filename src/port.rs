//! # RTOS Port
//!
//! The delay engine owns no hardware and no scheduler. Everything it needs
//! from the platform is reached through the [`Rtos`] trait: a monotonic
//! microsecond clock, cooperative yield, tick sleep, one-shot timers,
//! task-local storage slots and direct-to-task notifications.
//!
//! A port is usually a zero-sized type or a cheap handle onto the real
//! RTOS. See `arch::host` for a complete port on std threads.

use crate::error::TimerError;

/// Timer expiry callback. Invoked once by the timer subsystem with the
/// task identity passed to [`Rtos::timer_create`].
pub type ExpiryCallback<R> = fn(&R, <R as Rtos>::TaskId);

/// Destructor run by the RTOS for a task-local slot when its task is deleted.
pub type SlotDestructor<R> = fn(&R, <R as Rtos>::Timer);

/// Monotonic microsecond time source.
pub trait Clock {
    /// Microseconds since an arbitrary fixed origin. Never goes backwards.
    fn now_us(&self) -> u64;
}

/// Collaborators consumed by the delay engine.
pub trait Rtos: Clock + Sized {
    /// Identity of a task, as handed to the expiry callback.
    type TaskId: Copy + Eq + core::fmt::Debug;

    /// Handle of a one-shot timer.
    type Timer: Copy + core::fmt::Debug;

    /// Length of one scheduler tick in microseconds.
    const TICK_PERIOD_US: u64;

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    /// Give up the processor; the calling task stays runnable.
    fn yield_now(&self);

    /// Block the calling task for `ticks` scheduler ticks.
    fn sleep_ticks(&self, ticks: u32);

    /// Identity of the calling task.
    fn current_task(&self) -> Self::TaskId;

    /// Ask for a context switch on the way out of callback context.
    /// Ports whose notify primitive already reschedules leave this empty.
    fn request_reschedule(&self) {}

    // -----------------------------------------------------------------------
    // One-shot timers
    // -----------------------------------------------------------------------

    /// Create an idle one-shot timer that runs `callback(self, task)` on
    /// expiry. The callback is dispatched from task context.
    fn timer_create(
        &self,
        callback: ExpiryCallback<Self>,
        task: Self::TaskId,
    ) -> Result<Self::Timer, TimerError>;

    /// Start `timer` to expire once, `delay_us` microseconds from now.
    fn timer_start_once(&self, timer: Self::Timer, delay_us: u64) -> Result<(), TimerError>;

    /// Stop and release `timer`.
    fn timer_delete(&self, timer: Self::Timer);

    // -----------------------------------------------------------------------
    // Task-local storage
    // -----------------------------------------------------------------------

    /// Timer stored in the calling task's `slot`, if any.
    fn tls_get(&self, slot: usize) -> Option<Self::Timer>;

    /// Store `timer` in the calling task's `slot`. The RTOS runs
    /// `destructor` with the stored timer when the task is deleted.
    fn tls_set_with_destructor(
        &self,
        slot: usize,
        timer: Self::Timer,
        destructor: SlotDestructor<Self>,
    );

    // -----------------------------------------------------------------------
    // Task notifications
    // -----------------------------------------------------------------------

    /// Block the calling task until it is notified or `timeout_us` elapses.
    /// Consumes pending notifications. Returns `false` on timeout.
    fn notify_wait(&self, timeout_us: u64) -> bool;

    /// Drop any notification pending for the calling task without blocking.
    fn notify_clear(&self) {
        self.notify_wait(0);
    }

    /// Notify `task` from callback context without blocking. Returns `true`
    /// if the woken task outranks the one currently running.
    fn notify_from_callback(&self, task: Self::TaskId) -> bool;
}
