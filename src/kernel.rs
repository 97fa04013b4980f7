//! # Kernel
//!
//! The public operations of EdfOS. [`Kernel`] pairs the [`Scheduler`] with a
//! [`Port`] and runs every task-side operation under the same protocol:
//!
//! ```text
//!  mask ─► mutate lists ─► switch if the current task changed ─► unmask
//!                                                                  │
//!            (caller resumes here once selected again) ◄───────────┘
//!                               │
//!  mask ─► deadline check, withdraw own entry if expired ─► unmask
//! ```
//!
//! The second half only exists for the blocking calls (`wait`, `send_wait`,
//! `receive_wait`).
//!
//! On the Cortex-M4 target a single global kernel is exposed through free
//! functions, mirroring the startup sequence:
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← Reset, create idle
//!         ├─► kernel::create_task() ← Register tasks (×N)
//!         └─► kernel::start()       ← Launch scheduler (no return)
//!               ├─► Configure SysTick
//!               ├─► Set interrupt priorities
//!               └─► Load the most urgent task through PendSV
//! ```

use crate::arch::Port;
use crate::error::Result;
use crate::ipc::Transfer;
use crate::mailbox::{Mailbox, MailboxId};
use crate::scheduler::Scheduler;
use crate::task::{TaskEntry, TaskId};

/// Body of the always-present idle task.
extern "C" fn idle_task() {
    loop {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        cortex_m::asm::wfi();
        #[cfg(not(all(target_arch = "arm", target_os = "none")))]
        core::hint::spin_loop();
    }
}

/// A scheduler driven through a hardware port.
pub struct Kernel<P: Port> {
    sched: Scheduler,
    port: P,
}

impl<P: Port> Kernel<P> {
    pub const fn new(port: P) -> Self {
        Self {
            sched: Scheduler::new(),
            port,
        }
    }

    /// Run `f` on the scheduler with interrupts masked, switching before
    /// unmasking if `f` changed the current task.
    fn protected<R>(&mut self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        self.port.mask_interrupts();
        let out = f(&mut self.sched);
        if self.sched.take_reschedule() {
            self.port.context_switch();
        }
        self.port.unmask_interrupts();
        out
    }

    /// Reset the kernel: tick 0, empty lists, only the idle task.
    pub fn init(&mut self) -> Result<()> {
        self.port.mask_interrupts();
        let out = self.sched.init(idle_task).map(|idle| {
            self.port.init_context(self.sched.task_mut(idle));
        });
        self.port.unmask_interrupts();
        out
    }

    /// Create a task with the given absolute deadline. Once running, a
    /// strictly more urgent task takes over the CPU immediately.
    pub fn create_task(&mut self, entry: TaskEntry, deadline: u32) -> Result<TaskId> {
        let port = &self.port;
        port.mask_interrupts();
        let out = self.sched.create_task(entry, deadline).map(|id| {
            port.init_context(self.sched.task_mut(id));
            id
        });
        if self.sched.take_reschedule() {
            port.context_switch();
        }
        port.unmask_interrupts();
        out
    }

    /// Start scheduling with the most urgent Ready task. Does not return on
    /// hardware; fails if `init` was never called.
    pub fn run(&mut self) -> Result<()> {
        self.port.mask_interrupts();
        if let Err(e) = self.sched.start() {
            self.port.unmask_interrupts();
            return Err(e);
        }
        self.port.load_context_on_start();
        Ok(())
    }

    /// End the calling task and hand the CPU to the next Ready task. A no-op
    /// when nothing else is left in Ready.
    pub fn terminate(&mut self) {
        self.port.mask_interrupts();
        let leaving = match self.sched.retire_current() {
            Some(id) => id,
            None => {
                self.port.unmask_interrupts();
                return;
            }
        };
        self.port.switch_stack_to_next();
        self.sched.release_task(leaving);
        self.port.load_context_on_terminate();
    }

    /// Sleep for `ticks` ticks. Fails with `DeadlineReached` if the caller's
    /// deadline had passed by the time it resumed.
    pub fn wait(&mut self, ticks: u32) -> Result<()> {
        let me = self.protected(|s| s.sleep(ticks))?;
        self.protected(|s| s.resume_check(me))
    }

    /// Change the calling task's deadline. Yields if another task becomes
    /// more urgent.
    pub fn set_deadline(&mut self, deadline: u32) -> Result<()> {
        self.protected(|s| s.set_deadline(deadline))
    }

    /// Deadline of the calling task.
    pub fn deadline(&self) -> Result<u32> {
        self.sched.deadline()
    }

    /// Ticks since the kernel started.
    pub fn ticks(&self) -> u32 {
        self.sched.ticks()
    }

    pub fn create_mailbox(&mut self, capacity: usize, payload_size: usize) -> Result<MailboxId> {
        self.protected(|s| s.create_mailbox(capacity, payload_size))
    }

    /// Remove an empty mailbox; `NotEmpty` if anything is queued on it.
    pub fn remove_mailbox(&mut self, mbox: MailboxId) -> Result<()> {
        self.protected(|s| s.remove_mailbox(mbox))
    }

    /// Send `data`, blocking until a receiver takes it. Fails if the payload
    /// was evicted from a full mailbox first.
    pub fn send_wait(&mut self, mbox: MailboxId, data: &[u8]) -> Result<()> {
        let (me, transfer) = self.protected(|s| {
            let me = s.current_task()?;
            s.send_wait(mbox, data).map(|t| (me, t))
        })?;
        match transfer {
            Transfer::Completed => self.protected(|s| s.resume_check(me)),
            Transfer::Blocked => self.protected(|s| s.finish_send(me)),
        }
    }

    /// Receive into `buf`, blocking until a payload arrives.
    pub fn receive_wait(&mut self, mbox: MailboxId, buf: &mut [u8]) -> Result<()> {
        let (me, transfer) = self.protected(|s| {
            let me = s.current_task()?;
            s.receive_wait(mbox, buf).map(|t| (me, t))
        })?;
        match transfer {
            Transfer::Completed => self.protected(|s| s.resume_check(me)),
            Transfer::Blocked => self.protected(|s| s.finish_receive(me, mbox, buf)),
        }
    }

    /// Queue `data` without blocking, evicting the oldest entry when full.
    pub fn send_no_wait(&mut self, mbox: MailboxId, data: &[u8]) -> Result<()> {
        self.protected(|s| s.send_no_wait(mbox, data))
    }

    /// Take the oldest payload without blocking; `Fail` if there is none.
    pub fn receive_no_wait(&mut self, mbox: MailboxId, buf: &mut [u8]) -> Result<()> {
        self.protected(|s| s.receive_no_wait(mbox, buf))
    }

    /// Tick interrupt body: promote due tasks and switch if one of them is
    /// now the most urgent.
    pub fn tick(&mut self) {
        self.protected(Scheduler::tick)
    }

    /// A live mailbox, for inspection.
    pub fn mailbox(&self, mbox: MailboxId) -> Result<&Mailbox> {
        self.sched.mailbox(mbox)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.sched
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

// ---------------------------------------------------------------------------
// Global kernel instance (Cortex-M4)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::global::*;

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod global {
    use core::ptr::addr_of_mut;

    use super::Kernel;
    use crate::arch::cortex_m4::{self, CortexM4};
    use crate::error::Result;
    use crate::mailbox::MailboxId;
    use crate::sync;
    use crate::task::{TaskEntry, TaskId};

    /// Global kernel instance.
    ///
    /// # Safety
    /// Tasks touch it only inside masked sections; SysTick and PendSV run at
    /// the lowest priority and cannot interrupt those sections.
    static mut KERNEL: Kernel<CortexM4> = Kernel::new(CortexM4);

    /// The global kernel, for the port's exception handlers.
    ///
    /// # Safety
    /// See [`KERNEL`].
    pub unsafe fn instance() -> &'static mut Kernel<CortexM4> {
        &mut *addr_of_mut!(KERNEL)
    }

    /// Initialize the kernel. Must be called once from `main` before any
    /// other kernel function.
    pub fn init() -> Result<()> {
        sync::critical_section(|_cs| unsafe { instance().init() })
    }

    pub fn create_task(entry: TaskEntry, deadline: u32) -> Result<TaskId> {
        unsafe { instance().create_task(entry, deadline) }
    }

    /// Start the scheduler. **Does not return.**
    ///
    /// Configures SysTick, sets PendSV and SysTick priorities, and loads the
    /// most urgent task.
    pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
        cortex_m4::configure_systick(&mut core_peripherals.SYST);
        cortex_m4::set_interrupt_priorities();

        // Only returns if `init` was never called.
        let _ = unsafe { instance().run() };
        loop {
            cortex_m::asm::wfi();
        }
    }

    pub fn terminate() {
        unsafe { instance().terminate() }
    }

    pub fn wait(ticks: u32) -> Result<()> {
        unsafe { instance().wait(ticks) }
    }

    pub fn set_deadline(deadline: u32) -> Result<()> {
        unsafe { instance().set_deadline(deadline) }
    }

    pub fn deadline() -> Result<u32> {
        unsafe { instance().deadline() }
    }

    pub fn ticks() -> u32 {
        unsafe { instance().ticks() }
    }

    pub fn create_mailbox(capacity: usize, payload_size: usize) -> Result<MailboxId> {
        unsafe { instance().create_mailbox(capacity, payload_size) }
    }

    pub fn remove_mailbox(mbox: MailboxId) -> Result<()> {
        unsafe { instance().remove_mailbox(mbox) }
    }

    pub fn send_wait(mbox: MailboxId, data: &[u8]) -> Result<()> {
        unsafe { instance().send_wait(mbox, data) }
    }

    pub fn receive_wait(mbox: MailboxId, buf: &mut [u8]) -> Result<()> {
        unsafe { instance().receive_wait(mbox, buf) }
    }

    pub fn send_no_wait(mbox: MailboxId, data: &[u8]) -> Result<()> {
        unsafe { instance().send_no_wait(mbox, data) }
    }

    pub fn receive_no_wait(mbox: MailboxId, buf: &mut [u8]) -> Result<()> {
        unsafe { instance().receive_no_wait(mbox, buf) }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
