use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::error::TimerError;
use crate::port::{Clock, ExpiryCallback, Rtos, SlotDestructor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockTask(pub u32);

struct MockTimer {
    callback: ExpiryCallback<MockRtos>,
    task: MockTask,
    deadline: Option<u64>,
    deleted: bool,
}

// Deterministic single-threaded RTOS. Time only moves when the code under
// test yields, sleeps or waits, so every elapsed value is exact.
//
// A notify_wait with an armed timer owned by the waiting task fast-forwards
// the clock to the expiry, adds `wake_latency_us` and runs the callback.
pub struct MockRtos {
    now: Cell<u64>,
    yield_step_us: Cell<u64>,
    yields: Cell<u32>,
    current: Cell<MockTask>,
    tick_sleeps: RefCell<Vec<u32>>,
    timers: RefCell<Vec<MockTimer>>,
    starts: RefCell<Vec<(usize, u64)>>,
    creates: Cell<u32>,
    create_cost_us: Cell<u64>,
    fail_create: Cell<bool>,
    fail_arm: Cell<bool>,
    tls: RefCell<HashMap<(MockTask, usize), (usize, SlotDestructor<MockRtos>)>>,
    notifications: RefCell<HashMap<MockTask, u32>>,
    wake_latency_us: Cell<u64>,
    drop_wakes: Cell<bool>,
    wait_timeouts: RefCell<Vec<u64>>,
    outranks_current: Cell<bool>,
    reschedules: Cell<u32>,
}

impl MockRtos {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0),
            yield_step_us: Cell::new(1),
            yields: Cell::new(0),
            current: Cell::new(MockTask(1)),
            tick_sleeps: RefCell::new(Vec::new()),
            timers: RefCell::new(Vec::new()),
            starts: RefCell::new(Vec::new()),
            creates: Cell::new(0),
            create_cost_us: Cell::new(0),
            fail_create: Cell::new(false),
            fail_arm: Cell::new(false),
            tls: RefCell::new(HashMap::new()),
            notifications: RefCell::new(HashMap::new()),
            wake_latency_us: Cell::new(0),
            drop_wakes: Cell::new(false),
            wait_timeouts: RefCell::new(Vec::new()),
            outranks_current: Cell::new(false),
            reschedules: Cell::new(0),
        }
    }

    pub fn set_yield_step_us(&self, us: u64) {
        self.yield_step_us.set(us);
    }

    pub fn set_wake_latency_us(&self, us: u64) {
        self.wake_latency_us.set(us);
    }

    pub fn set_current_task(&self, task: MockTask) {
        self.current.set(task);
    }

    pub fn set_create_cost_us(&self, us: u64) {
        self.create_cost_us.set(us);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.set(fail);
    }

    pub fn set_fail_arm(&self, fail: bool) {
        self.fail_arm.set(fail);
    }

    pub fn set_drop_wakes(&self, drop: bool) {
        self.drop_wakes.set(drop);
    }

    pub fn set_outranks_current(&self, outranks: bool) {
        self.outranks_current.set(outranks);
    }

    pub fn yields(&self) -> u32 {
        self.yields.get()
    }

    pub fn tick_sleeps(&self) -> Vec<u32> {
        self.tick_sleeps.borrow().clone()
    }

    /// Every `timer_start_once` call as (timer, delay_us).
    pub fn timer_starts(&self) -> Vec<(usize, u64)> {
        self.starts.borrow().clone()
    }

    pub fn timer_creates(&self) -> u32 {
        self.creates.get()
    }

    pub fn timer_task(&self, timer: usize) -> MockTask {
        self.timers.borrow()[timer].task
    }

    pub fn timer_deleted(&self, timer: usize) -> bool {
        self.timers.borrow()[timer].deleted
    }

    pub fn wait_timeouts(&self) -> Vec<u64> {
        self.wait_timeouts.borrow().clone()
    }

    pub fn pending_notifications(&self, task: MockTask) -> u32 {
        self.notifications.borrow().get(&task).copied().unwrap_or(0)
    }

    pub fn reschedules(&self) -> u32 {
        self.reschedules.get()
    }

    /// Expire `timer` right now, as the timer service would.
    pub fn fire(&self, timer: usize) {
        let (callback, task) = {
            let mut timers = self.timers.borrow_mut();
            let entry = &mut timers[timer];
            entry.deadline = None;
            (entry.callback, entry.task)
        };
        callback(self, task);
    }

    /// Delete `task`, running its slot destructors.
    pub fn delete_task(&self, task: MockTask) {
        let owned: Vec<(usize, SlotDestructor<MockRtos>)> = {
            let mut tls = self.tls.borrow_mut();
            let keys: Vec<_> = tls.keys().filter(|(t, _)| *t == task).copied().collect();
            keys.into_iter().filter_map(|k| tls.remove(&k)).collect()
        };
        for (timer, destructor) in owned {
            destructor(self, timer);
        }
    }

    fn armed_timer_of(&self, task: MockTask) -> Option<(usize, u64)> {
        self.timers
            .borrow()
            .iter()
            .enumerate()
            .find_map(|(idx, t)| match t.deadline {
                Some(deadline) if t.task == task && !t.deleted => Some((idx, deadline)),
                _ => None,
            })
    }

    fn take_notification(&self, task: MockTask) -> bool {
        let mut notes = self.notifications.borrow_mut();
        match notes.get_mut(&task) {
            Some(count) if *count > 0 => {
                *count = 0;
                true
            }
            _ => false,
        }
    }
}

impl Clock for MockRtos {
    fn now_us(&self) -> u64 {
        self.now.get()
    }
}

impl Rtos for MockRtos {
    type TaskId = MockTask;
    type Timer = usize;

    const TICK_PERIOD_US: u64 = 1000;

    fn yield_now(&self) {
        self.yields.set(self.yields.get() + 1);
        self.now.set(self.now.get() + self.yield_step_us.get());
    }

    fn sleep_ticks(&self, ticks: u32) {
        self.tick_sleeps.borrow_mut().push(ticks);
        self.now
            .set(self.now.get() + ticks as u64 * Self::TICK_PERIOD_US);
    }

    fn current_task(&self) -> MockTask {
        self.current.get()
    }

    fn request_reschedule(&self) {
        self.reschedules.set(self.reschedules.get() + 1);
    }

    fn timer_create(
        &self,
        callback: ExpiryCallback<Self>,
        task: MockTask,
    ) -> Result<usize, TimerError> {
        if self.fail_create.get() {
            return Err(TimerError::Create);
        }
        self.creates.set(self.creates.get() + 1);
        self.now.set(self.now.get() + self.create_cost_us.get());
        let mut timers = self.timers.borrow_mut();
        timers.push(MockTimer {
            callback,
            task,
            deadline: None,
            deleted: false,
        });
        Ok(timers.len() - 1)
    }

    fn timer_start_once(&self, timer: usize, delay_us: u64) -> Result<(), TimerError> {
        if self.fail_arm.get() {
            return Err(TimerError::Arm);
        }
        self.starts.borrow_mut().push((timer, delay_us));
        self.timers.borrow_mut()[timer].deadline = Some(self.now.get() + delay_us);
        Ok(())
    }

    fn timer_delete(&self, timer: usize) {
        let mut timers = self.timers.borrow_mut();
        timers[timer].deleted = true;
        timers[timer].deadline = None;
    }

    fn tls_get(&self, slot: usize) -> Option<usize> {
        self.tls
            .borrow()
            .get(&(self.current.get(), slot))
            .map(|(timer, _)| *timer)
    }

    fn tls_set_with_destructor(&self, slot: usize, timer: usize, destructor: SlotDestructor<Self>) {
        self.tls
            .borrow_mut()
            .insert((self.current.get(), slot), (timer, destructor));
    }

    fn notify_wait(&self, timeout_us: u64) -> bool {
        self.wait_timeouts.borrow_mut().push(timeout_us);
        let task = self.current.get();
        if self.take_notification(task) {
            return true;
        }

        let give_up = self.now.get() + timeout_us;
        if let Some((timer, deadline)) = self.armed_timer_of(task) {
            let woken_at = deadline + self.wake_latency_us.get();
            if !self.drop_wakes.get() && woken_at <= give_up {
                self.now.set(woken_at);
                self.fire(timer);
                return self.take_notification(task);
            }
        }
        self.now.set(give_up);
        false
    }

    fn notify_clear(&self) {
        self.take_notification(self.current.get());
    }

    fn notify_from_callback(&self, task: MockTask) -> bool {
        *self.notifications.borrow_mut().entry(task).or_insert(0) += 1;
        self.outranks_current.get()
    }
}
