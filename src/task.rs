//! # Task Control Block
//!
//! Defines the task model for EdfOS. A task is a zero-argument entry routine
//! with its own stack and an absolute deadline in ticks; the numerically
//! smallest deadline is the most urgent.
//!
//! TCBs live in the scheduler's [`NodePool`](crate::list::NodePool): the pool
//! slot *is* the list node, so the [`TaskId`] of a task is the handle of the
//! node that carries it between the Ready, Waiting and Timer queues.

use core::cmp::Ordering;

use crate::config::{MAX_PAYLOAD, STACK_SIZE};
use crate::list::NodeId;
use crate::mailbox::MailboxId;

/// Handle of a task: its node in the scheduler's task pool.
pub type TaskId = NodeId;

/// Task entry routine. A routine that returns is terminated by the port's
/// exit trampoline.
pub type TaskEntry = extern "C" fn();

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Which queue a task is linked into.
///
/// ```text
///                  wait(n)               tick: wake tick or deadline due
///   create ──► Ready ─────────► Sleeping ───────────────────────┐
///               ▲ │                                           │
///               │ └──────────► Waiting ── matching send/recv ─┤
///               │  send/recv            or tick: deadline due │
///               └─────────────────────────────────────────────┘
/// ```
///
/// Running is not a state of its own: the running task is the Ready head
/// whose context is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Linked into the Ready list.
    Ready,
    /// Linked into the Waiting list, parked on a mailbox.
    Waiting,
    /// Linked into the Timer list until its wake tick.
    Sleeping,
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// Per-task stack memory. Aligned to 8 bytes as required by ARM AAPCS.
#[repr(C, align(8))]
pub struct Stack(pub [u8; STACK_SIZE]);

impl Stack {
    pub const fn new() -> Self {
        Self([0u8; STACK_SIZE])
    }

    /// One past the highest usable address.
    pub fn top(&mut self) -> *mut u8 {
        self.0.as_mut_ptr_range().end
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// Holds everything needed to schedule and context-switch a task. The
/// `stack_pointer` field points into `stack` and is only written by the port
/// (initial frame) and by the context-switch path.
pub struct Tcb {
    /// Entry routine, kept for the initial stack frame.
    pub entry: TaskEntry,

    /// Absolute deadline in ticks. Smaller is more urgent.
    pub deadline: u32,

    /// Tick at which a sleeping task becomes due again.
    pub wake_tick: u32,

    /// Queue the task is currently linked into.
    pub state: TaskState,

    /// Saved stack pointer (PSP). Updated on context switch.
    pub stack_pointer: *mut u32,

    /// Mailbox entry this task owns while parked, if any.
    pub pending: Option<(MailboxId, NodeId)>,

    /// Payload handed over directly by a sender while this task was parked
    /// as a receiver.
    pub inbox: [u8; MAX_PAYLOAD],

    /// Whether `inbox` holds an undelivered payload.
    pub delivered: bool,

    /// Set when this task's blocked send was evicted from a full mailbox
    /// before any receiver took it.
    pub evicted: bool,

    /// Per-task stack memory.
    pub stack: Stack,
}

// Safety: `stack_pointer` always points into the TCB's own stack, and TCBs
// are only touched with interrupts masked.
unsafe impl Send for Tcb {}

impl Tcb {
    /// Fresh TCB, ready to be linked into the Ready list. The port builds the
    /// initial frame once the TCB sits at its final address.
    pub const fn new(entry: TaskEntry, deadline: u32) -> Self {
        Self {
            entry,
            deadline,
            wake_tick: 0,
            state: TaskState::Ready,
            stack_pointer: core::ptr::null_mut(),
            pending: None,
            inbox: [0u8; MAX_PAYLOAD],
            delivered: false,
            evicted: false,
            stack: Stack::new(),
        }
    }

    /// Whether the deadline has been reached at tick `now`.
    #[inline]
    pub fn is_overdue(&self, now: u32) -> bool {
        self.deadline <= now
    }
}

/// Ready / Waiting ordering: earliest deadline first.
pub fn by_deadline(a: &Tcb, b: &Tcb) -> Ordering {
    a.deadline.cmp(&b.deadline)
}

/// Timer ordering: earliest wake tick first.
pub fn by_wake_tick(a: &Tcb, b: &Tcb) -> Ordering {
    a.wake_tick.cmp(&b.wake_tick)
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_task() {}

    #[test]
    fn test_tcb_initialization() {
        let tcb = Tcb::new(dummy_task, 40);
        assert_eq!(tcb.deadline, 40);
        assert_eq!(tcb.state, TaskState::Ready);
        assert!(tcb.stack_pointer.is_null());
        assert!(tcb.pending.is_none());
        assert!(!tcb.delivered);
        assert!(!tcb.evicted);
    }

    #[test]
    fn test_overdue_is_inclusive() {
        let tcb = Tcb::new(dummy_task, 10);
        assert!(!tcb.is_overdue(9));
        assert!(tcb.is_overdue(10));
        assert!(tcb.is_overdue(11));
    }

    #[test]
    fn test_orderings() {
        let mut a = Tcb::new(dummy_task, 5);
        let mut b = Tcb::new(dummy_task, 9);
        assert_eq!(by_deadline(&a, &b), Ordering::Less);

        a.wake_tick = 20;
        b.wake_tick = 3;
        assert_eq!(by_wake_tick(&a, &b), Ordering::Greater);
        assert_eq!(by_deadline(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_stack_alignment() {
        let mut stack = Stack::new();
        assert_eq!(stack.top() as usize % 8, 0);
        assert_eq!(core::mem::align_of::<Stack>(), 8);
    }
}
