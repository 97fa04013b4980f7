//! # Scheduler
//!
//! Core scheduling state for EdfOS: the task pool, the three deadline-ordered
//! queues and the notion of the *current* task (the one selected to run, which
//! is running as soon as the pending switch has been taken).
//!
//! The scheduler is a plain state machine. It never touches hardware: every
//! operation mutates the queues and, when a different task must run, raises
//! `needs_reschedule`. The [`Kernel`](crate::kernel::Kernel) runs each
//! operation with interrupts masked and hands the flag to the port's
//! context-switch primitive.
//!
//! ## Queues
//!
//! | Queue   | Members                     | Order          |
//! |---------|-----------------------------|----------------|
//! | Ready   | runnable tasks (and idle)   | deadline       |
//! | Waiting | tasks parked on a mailbox   | deadline       |
//! | Timer   | tasks sleeping in `wait(n)` | wake tick      |
//!
//! The current task is always the Ready head. The idle task carries the
//! largest possible deadline, so Ready is never empty once the kernel is
//! initialized and idle runs only when nothing else can.
//!
//! ## Tick
//!
//! On every tick the Timer list is scanned in full (a sleeper is due when its
//! wake tick has come *or* its deadline has passed) and the Waiting list is
//! drained from the head while deadlines have passed. All due tasks reach
//! Ready before the most urgent of them is selected.

use crate::config::{IDLE_DEADLINE, MAX_MAILBOXES, MAX_TASKS};
use crate::error::{Error, Result};
use crate::list::{List, NodePool};
use crate::mailbox::{Mailbox, MessagePool};
use crate::task::{by_deadline, by_wake_tick, TaskEntry, TaskId, TaskState, Tcb};

/// Whether the kernel has been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelMode {
    /// Tasks are being created; nothing runs yet.
    Init,
    /// The first task has been loaded.
    Running,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state. Owned by the kernel and only mutated with
/// interrupts masked.
pub struct Scheduler {
    /// TCB storage; a slot doubles as the task's list node.
    pub(crate) tasks: NodePool<Tcb, MAX_TASKS>,

    pub(crate) ready: List,
    pub(crate) waiting: List,
    pub(crate) timer: List,

    /// Mailbox storage; mailboxes are never linked, the pool is used as a
    /// slot allocator only.
    pub(crate) mailboxes: NodePool<Mailbox, MAX_MAILBOXES>,

    /// Entries of every mailbox.
    pub(crate) messages: MessagePool,

    /// Current generation of each mailbox slot.
    pub(crate) generations: [u16; MAX_MAILBOXES],

    /// Monotonic tick counter.
    tick_count: u32,

    mode: KernelMode,

    /// Task selected to run.
    current: Option<TaskId>,

    /// Task whose context is on the CPU. Lags `current` until the port has
    /// taken the pending switch.
    loaded: Option<TaskId>,

    idle: Option<TaskId>,

    /// Set when `current` changed and a context switch should occur.
    needs_reschedule: bool,
}

impl Scheduler {
    /// Create an empty scheduler with no tasks, not even idle.
    pub const fn new() -> Self {
        Self {
            tasks: NodePool::new(),
            ready: List::new(),
            waiting: List::new(),
            timer: List::new(),
            mailboxes: NodePool::new(),
            messages: NodePool::new(),
            generations: [0; MAX_MAILBOXES],
            tick_count: 0,
            mode: KernelMode::Init,
            current: None,
            loaded: None,
            idle: None,
            needs_reschedule: false,
        }
    }

    /// Reset to a fresh kernel holding only the idle task.
    pub fn init(&mut self, idle: TaskEntry) -> Result<TaskId> {
        let generations = self.generations.map(|g| g.wrapping_add(1));
        *self = Self::new();
        self.generations = generations;
        let id = self.create_task(idle, IDLE_DEADLINE)?;
        self.idle = Some(id);
        Ok(id)
    }

    /// Allocate a task and link it into Ready by deadline.
    ///
    /// Once the kernel runs, a task strictly more urgent than the current one
    /// preempts it; equal deadlines do not.
    pub fn create_task(&mut self, entry: TaskEntry, deadline: u32) -> Result<TaskId> {
        let id = self.tasks.alloc(Tcb::new(entry, deadline))?;
        self.ready.insert_sorted(&mut self.tasks, id, by_deadline);

        if self.mode == KernelMode::Running {
            let preempts = match self.current {
                Some(cur) => deadline < self.tasks.get(cur).deadline,
                None => true,
            };
            if preempts {
                self.current = self.ready.head();
                self.needs_reschedule = true;
            }
        }

        trace!("task {} created, deadline {}", id, deadline);
        Ok(id)
    }

    /// Enter running mode and select the first task.
    pub fn start(&mut self) -> Result<TaskId> {
        let first = self.ready.head().ok_or(Error::Fail)?;
        self.tick_count = 0;
        self.mode = KernelMode::Running;
        self.current = Some(first);
        self.needs_reschedule = false;
        debug!("kernel started, first task {}", first);
        Ok(first)
    }

    /// Unlink the current task from Ready and select its successor.
    ///
    /// Returns `None` when there is nothing to hand over to (the current task
    /// is the only one left in Ready). The retired TCB stays allocated until
    /// [`release_task`](Self::release_task).
    pub fn retire_current(&mut self) -> Option<TaskId> {
        let leaving = self.current?;
        if self.ready.len() <= 1 {
            return None;
        }
        self.ready.unlink(&mut self.tasks, leaving);
        self.current = self.ready.head();
        debug!("task {} terminated", leaving);
        Some(leaving)
    }

    /// Free a retired task's slot. The slot is only marked vacant; its stack
    /// memory is not touched until a later `create_task` reuses it.
    pub fn release_task(&mut self, id: TaskId) {
        if self.loaded == Some(id) {
            self.loaded = None;
        }
        self.tasks.release(id);
    }

    /// Move the current task to the Timer list for `ticks` ticks.
    pub fn sleep(&mut self, ticks: u32) -> Result<TaskId> {
        let me = self.current_task()?;
        self.ready.unlink(&mut self.tasks, me);

        let tcb = self.tasks.get_mut(me);
        tcb.wake_tick = self.tick_count.saturating_add(ticks);
        tcb.state = TaskState::Sleeping;
        trace!("task {} sleeps until tick {}", me, tcb.wake_tick);

        self.timer.insert_sorted(&mut self.tasks, me, by_wake_tick);
        self.reselect();
        Ok(me)
    }

    /// Change the current task's deadline and re-sort it within Ready.
    pub fn set_deadline(&mut self, deadline: u32) -> Result<()> {
        let me = self.current_task()?;
        self.tasks.get_mut(me).deadline = deadline;
        self.ready.unlink(&mut self.tasks, me);
        self.ready.insert_sorted(&mut self.tasks, me, by_deadline);
        trace!("task {} deadline now {}", me, deadline);
        self.reselect();
        Ok(())
    }

    /// Timer interrupt body: advance time and promote every due task.
    pub fn tick(&mut self) {
        self.tick_count = self.tick_count.wrapping_add(1);
        if self.mode != KernelMode::Running {
            return;
        }
        let now = self.tick_count;

        let mut cursor = self.timer.head();
        while let Some(id) = cursor {
            cursor = self.tasks.next(id);
            let tcb = self.tasks.get(id);
            if tcb.wake_tick <= now || tcb.is_overdue(now) {
                self.timer.unlink(&mut self.tasks, id);
                self.make_ready(id);
                trace!("tick {}: task {} woke", now, id);
            }
        }

        while let Some(id) = self.waiting.head() {
            if !self.tasks.get(id).is_overdue(now) {
                break;
            }
            self.waiting.unlink(&mut self.tasks, id);
            self.abandon_pending(id);
            self.make_ready(id);
            warn!("tick {}: task {} missed its deadline while waiting", now, id);
        }

        self.reselect();
    }

    /// Resumption check for a blocking call made by `id`: fails with
    /// [`Error::DeadlineReached`] if its deadline has passed, withdrawing any
    /// mailbox entry it still owns.
    pub fn resume_check(&mut self, id: TaskId) -> Result<()> {
        if !self.tasks.get(id).is_overdue(self.tick_count) {
            return Ok(());
        }
        self.abandon_pending(id);
        warn!("task {} resumed past deadline {}", id, self.tasks.get(id).deadline);
        Err(Error::DeadlineReached)
    }

    // -----------------------------------------------------------------------
    // Queue moves shared with the IPC paths
    // -----------------------------------------------------------------------

    /// Link an unlinked task into Ready.
    pub(crate) fn make_ready(&mut self, id: TaskId) {
        self.tasks.get_mut(id).state = TaskState::Ready;
        self.ready.insert_sorted(&mut self.tasks, id, by_deadline);
    }

    /// Move a task from Ready to Waiting.
    pub(crate) fn park(&mut self, id: TaskId) {
        self.ready.unlink(&mut self.tasks, id);
        self.tasks.get_mut(id).state = TaskState::Waiting;
        self.waiting.insert_sorted(&mut self.tasks, id, by_deadline);
    }

    /// Move a parked task from Waiting to Ready; its mailbox entry has
    /// already been consumed.
    pub(crate) fn unpark(&mut self, id: TaskId) {
        debug_assert_eq!(self.tasks.get(id).state, TaskState::Waiting);
        self.tasks.get_mut(id).pending = None;
        self.waiting.unlink(&mut self.tasks, id);
        self.make_ready(id);
    }

    /// Drop the mailbox entry `id` still owns, if any.
    fn abandon_pending(&mut self, id: TaskId) {
        if let Some((mbox, msg)) = self.tasks.get_mut(id).pending.take() {
            if self.mailbox(mbox).is_ok() {
                self.mailboxes.get_mut(mbox.slot).withdraw(&mut self.messages, msg);
            }
        }
    }

    /// Select the Ready head; flag a switch if that changes the current task.
    pub(crate) fn reselect(&mut self) {
        let head = self.ready.head();
        if head != self.current {
            self.current = head;
            self.needs_reschedule = true;
        }
    }

    // -----------------------------------------------------------------------
    // Context-switch support for the port
    // -----------------------------------------------------------------------

    /// Consume the reschedule request.
    pub fn take_reschedule(&mut self) -> bool {
        core::mem::replace(&mut self.needs_reschedule, false)
    }

    /// Record the stack pointer of the task whose context was just saved.
    /// Ignored when nothing is loaded (kernel start, after terminate).
    pub fn save_context(&mut self, sp: *mut u32) {
        if let Some(id) = self.loaded {
            self.tasks.get_mut(id).stack_pointer = sp;
        }
    }

    /// Mark the current task as loaded and return its saved stack pointer.
    pub fn load_context(&mut self) -> *mut u32 {
        self.loaded = self.current;
        match self.current {
            Some(id) => self.tasks.get(id).stack_pointer,
            None => core::ptr::null_mut(),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The task selected to run.
    pub fn current_task(&self) -> Result<TaskId> {
        self.current.ok_or(Error::Fail)
    }

    /// Deadline of the current task.
    pub fn deadline(&self) -> Result<u32> {
        Ok(self.tasks.get(self.current_task()?).deadline)
    }

    /// Global tick counter.
    pub fn ticks(&self) -> u32 {
        self.tick_count
    }

    pub fn mode(&self) -> KernelMode {
        self.mode
    }

    pub fn idle_task(&self) -> Option<TaskId> {
        self.idle
    }

    /// TCB of a live task.
    pub fn task(&self, id: TaskId) -> Option<&Tcb> {
        self.tasks.contains(id).then(|| self.tasks.get(id))
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> &mut Tcb {
        self.tasks.get_mut(id)
    }

    /// Ready queue, head first.
    pub fn ready(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.ready.iter(&self.tasks)
    }

    /// Waiting queue, head first.
    pub fn waiting(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.waiting.iter(&self.tasks)
    }

    /// Timer queue, head first.
    pub fn timer(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.timer.iter(&self.tasks)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
