//! # Host Port
//!
//! A complete [`Rtos`] port on std threads, for simulation and for running
//! delay-dependent code on a development machine.
//!
//! | RTOS concept        | Host mapping                                        |
//! |---------------------|-----------------------------------------------------|
//! | task                | OS thread (id assigned on first use)                |
//! | yield               | `std::thread::yield_now`                            |
//! | tick sleep          | `std::thread::sleep` for whole 1 ms ticks           |
//! | one-shot timer      | entry in a table served by a dedicated timer thread |
//! | timer callback ctx  | the timer thread (task context, never a signal)     |
//! | task-local slot     | `thread_local!` table, destructors run at exit      |
//! | task notification   | per-task counter behind a `Mutex` + `Condvar`       |

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::TimerError;
use crate::port::{Clock, ExpiryCallback, Rtos, SlotDestructor};

/// Timer slots available per port unless configured otherwise.
pub const DEFAULT_TIMER_LIMIT: usize = 64;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TASK_ID: HostTask = HostTask(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
    static SLOTS: RefCell<SlotTable> = RefCell::new(SlotTable(Vec::new()));
}

/// Identity of a host task (thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostTask(u64);

/// Handle into the port's timer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostTimer(usize);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Timer service
// ---------------------------------------------------------------------------

struct TimerSlot {
    callback: ExpiryCallback<HostRtos>,
    task: HostTask,
    /// Generation of the pending expiry, if armed.
    armed: Option<u64>,
}

struct TimerTable {
    slots: Vec<Option<TimerSlot>>,
    limit: usize,
    queue: BinaryHeap<Reverse<(Instant, usize, u64)>>,
    next_generation: u64,
    shutdown: bool,
}

struct TimerService {
    table: Mutex<TimerTable>,
    wakeup: Condvar,
}

impl TimerService {
    // Wait for the earliest due expiry that is still current.
    fn next_expiry(&self) -> Option<(ExpiryCallback<HostRtos>, HostTask)> {
        let mut table = lock(&self.table);
        loop {
            if table.shutdown {
                return None;
            }
            let now = Instant::now();
            match table.queue.peek().copied() {
                Some(Reverse((deadline, idx, generation))) if deadline <= now => {
                    table.queue.pop();
                    if let Some(Some(slot)) = table.slots.get_mut(idx) {
                        if slot.armed == Some(generation) {
                            slot.armed = None;
                            return Some((slot.callback, slot.task));
                        }
                    }
                }
                Some(Reverse((deadline, _, _))) => {
                    table = self
                        .wakeup
                        .wait_timeout(table, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    table = self
                        .wakeup
                        .wait(table)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn run(service: Arc<TimerService>, port: Weak<Shared>) {
        while let Some((callback, task)) = service.next_expiry() {
            let Some(inner) = port.upgrade() else {
                break;
            };
            callback(&HostRtos { inner }, task);
        }
    }
}

// ---------------------------------------------------------------------------
// Task-local slots
// ---------------------------------------------------------------------------

struct SlotEntry {
    port: u64,
    slot: usize,
    timer: HostTimer,
    owner: Weak<Shared>,
    destructor: SlotDestructor<HostRtos>,
}

struct SlotTable(Vec<SlotEntry>);

impl Drop for SlotTable {
    // Thread exit is task deletion
    fn drop(&mut self) {
        for entry in self.0.drain(..) {
            if let Some(inner) = entry.owner.upgrade() {
                (entry.destructor)(&HostRtos { inner }, entry.timer);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

struct Shared {
    id: u64,
    origin: Instant,
    timers: Arc<TimerService>,
    notes: Mutex<HashMap<HostTask, u32>>,
    notified: Condvar,
}

impl Drop for Shared {
    fn drop(&mut self) {
        lock(&self.timers.table).shutdown = true;
        self.timers.wakeup.notify_all();
    }
}

/// RTOS port backed by std threads. Cheap to clone; clones share timers,
/// notifications and the clock origin.
#[derive(Clone)]
pub struct HostRtos {
    inner: Arc<Shared>,
}

impl HostRtos {
    pub fn new() -> io::Result<Self> {
        Self::with_timer_limit(DEFAULT_TIMER_LIMIT)
    }

    /// Port whose timer subsystem refuses to create more than `limit`
    /// live timers.
    pub fn with_timer_limit(limit: usize) -> io::Result<Self> {
        let timers = Arc::new(TimerService {
            table: Mutex::new(TimerTable {
                slots: Vec::new(),
                limit,
                queue: BinaryHeap::new(),
                next_generation: 0,
                shutdown: false,
            }),
            wakeup: Condvar::new(),
        });
        let inner = Arc::new(Shared {
            id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
            origin: Instant::now(),
            timers: Arc::clone(&timers),
            notes: Mutex::new(HashMap::new()),
            notified: Condvar::new(),
        });

        let port = Arc::downgrade(&inner);
        thread::Builder::new()
            .name("microsleep-timer".into())
            .spawn(move || TimerService::run(timers, port))?;

        Ok(Self { inner })
    }

    /// Number of timers currently allocated.
    pub fn live_timers(&self) -> usize {
        lock(&self.inner.timers.table)
            .slots
            .iter()
            .filter(|s| s.is_some())
            .count()
    }
}

impl Clock for HostRtos {
    fn now_us(&self) -> u64 {
        self.inner.origin.elapsed().as_micros() as u64
    }
}

impl Rtos for HostRtos {
    type TaskId = HostTask;
    type Timer = HostTimer;

    const TICK_PERIOD_US: u64 = 1000;

    fn yield_now(&self) {
        thread::yield_now();
    }

    fn sleep_ticks(&self, ticks: u32) {
        thread::sleep(Duration::from_micros(ticks as u64 * Self::TICK_PERIOD_US));
    }

    fn current_task(&self) -> HostTask {
        TASK_ID.with(|id| *id)
    }

    fn timer_create(
        &self,
        callback: ExpiryCallback<Self>,
        task: HostTask,
    ) -> Result<HostTimer, TimerError> {
        let mut table = lock(&self.inner.timers.table);
        let live = table.slots.iter().filter(|s| s.is_some()).count();
        if live >= table.limit {
            return Err(TimerError::Create);
        }

        let slot = Some(TimerSlot {
            callback,
            task,
            armed: None,
        });
        let idx = match table.slots.iter().position(|s| s.is_none()) {
            Some(free) => {
                table.slots[free] = slot;
                free
            }
            None => {
                table.slots.push(slot);
                table.slots.len() - 1
            }
        };
        Ok(HostTimer(idx))
    }

    fn timer_start_once(&self, timer: HostTimer, delay_us: u64) -> Result<(), TimerError> {
        let deadline = Instant::now()
            .checked_add(Duration::from_micros(delay_us))
            .ok_or(TimerError::Arm)?;
        let mut table = lock(&self.inner.timers.table);
        let generation = table.next_generation;
        match table.slots.get_mut(timer.0) {
            Some(Some(slot)) => slot.armed = Some(generation),
            _ => return Err(TimerError::Arm),
        }
        table.next_generation += 1;
        table.queue.push(Reverse((deadline, timer.0, generation)));
        drop(table);

        self.inner.timers.wakeup.notify_all();
        Ok(())
    }

    fn timer_delete(&self, timer: HostTimer) {
        if let Some(slot) = lock(&self.inner.timers.table).slots.get_mut(timer.0) {
            *slot = None;
        }
    }

    fn tls_get(&self, slot: usize) -> Option<HostTimer> {
        let port = self.inner.id;
        SLOTS.with(|slots| {
            slots
                .borrow()
                .0
                .iter()
                .find(|e| e.port == port && e.slot == slot)
                .map(|e| e.timer)
        })
    }

    fn tls_set_with_destructor(
        &self,
        slot: usize,
        timer: HostTimer,
        destructor: SlotDestructor<Self>,
    ) {
        let entry = SlotEntry {
            port: self.inner.id,
            slot,
            timer,
            owner: Arc::downgrade(&self.inner),
            destructor,
        };
        SLOTS.with(|slots| {
            let mut slots = slots.borrow_mut();
            slots.0.retain(|e| !(e.port == entry.port && e.slot == slot));
            slots.0.push(entry);
        });
    }

    fn notify_wait(&self, timeout_us: u64) -> bool {
        let task = self.current_task();
        // None: too far out to represent, wait without timeout
        let deadline = Instant::now().checked_add(Duration::from_micros(timeout_us));
        let mut notes = lock(&self.inner.notes);
        loop {
            if let Some(count) = notes.get_mut(&task) {
                if *count > 0 {
                    *count = 0;
                    return true;
                }
            }
            notes = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.inner
                        .notified
                        .wait_timeout(notes, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .notified
                    .wait(notes)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn notify_clear(&self) {
        let task = self.current_task();
        lock(&self.inner.notes).remove(&task);
    }

    fn notify_from_callback(&self, task: HostTask) -> bool {
        *lock(&self.inner.notes).entry(task).or_insert(0) += 1;
        self.inner.notified.notify_all();
        // Host threads carry no priorities
        false
    }
}
