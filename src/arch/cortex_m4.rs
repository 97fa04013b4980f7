//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements [`Port`] with PendSV context switching, SysTick as the kernel
//! tick, and PRIMASK-based masking.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by `main` before start and by handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry, the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the active stack. PendSV saves and restores R4–R11 around
//! `edfos_switch_context`, which records the outgoing stack pointer in the
//! loaded task's TCB and returns the stack pointer of the scheduler's current
//! task.
//!
//! Every switch is deferred: the kernel pends PendSV while interrupts are
//! masked and the switch happens as soon as they are unmasked. Kernel start
//! and task exit pend PendSV with no loaded task, so nothing is saved.
//!
//! The port targets `thumbv7em-none-eabi`. Tasks do not use the FPU, so
//! every exception frame is the basic 8-word frame and PendSV always returns
//! through `0xFFFFFFFD`.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: Priority 0xFF (lowest)
//! - PendSV: Priority 0xFF (lowest), so it never preempts the tick

use cortex_m::peripheral::syst::SystClkSource;

use super::Port;
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::sync;
use crate::task::Tcb;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the kernel tick.
///
/// Fires `SysTick` at `TICK_HZ` using the processor clock. Each interrupt
/// advances the kernel's tick counter by one.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend a PendSV exception. It is taken once interrupts are unmasked and no
/// other handler is active.
#[inline]
pub fn trigger_pendsv() {
    cortex_m::peripheral::SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set PendSV and SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [23:16] = PendSV priority
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        let val = val | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// The Cortex-M4 implementation of [`Port`].
pub struct CortexM4;

impl Port for CortexM4 {
    #[inline]
    fn mask_interrupts(&self) {
        sync::enter();
    }

    #[inline]
    fn unmask_interrupts(&self) {
        sync::exit();
    }

    /// Lay out the initial stack frame so that the first PendSV return
    /// lands in the task's entry routine.
    ///
    /// ```text
    ///  High address (stack top)
    ///  ┌──────────┐
    ///  │  xPSR    │ ← 0x01000000 (Thumb bit)
    ///  │  PC      │ ← entry
    ///  │  LR      │ ← task_exit
    ///  │  R12     │
    ///  │  R3..R0  │
    ///  ├──────────┤ ← hardware frame
    ///  │  R11..R4 │ ← software frame
    ///  └──────────┘ ← stack_pointer
    ///  Low address
    /// ```
    fn init_context(&self, tcb: &mut Tcb) {
        let top = tcb.stack.top() as usize & !0x07;
        let frame = (top - 16 * 4) as *mut u32;

        unsafe {
            for i in 0..13 {
                *frame.add(i) = 0; // R4–R11, R0–R3, R12
            }
            *frame.add(13) = task_exit as usize as u32;
            *frame.add(14) = tcb.entry as usize as u32;
            *frame.add(15) = 0x0100_0000;
        }

        tcb.stack_pointer = frame;
    }

    #[inline]
    fn context_switch(&self) {
        trigger_pendsv();
    }

    fn load_context_on_start(&self) {
        trigger_pendsv();
        sync::release();
        loop {
            cortex_m::asm::wfi();
        }
    }

    /// The retired slot is only marked vacant, so the kernel may keep
    /// running on the old stack until PendSV moves off it.
    #[inline]
    fn switch_stack_to_next(&self) {}

    fn load_context_on_terminate(&self) {
        trigger_pendsv();
        sync::release();
        loop {
            cortex_m::asm::wfi();
        }
    }
}

/// Where a task's entry routine returns to.
extern "C" fn task_exit() {
    crate::kernel::terminate();
    // Only reached if the kernel refused to terminate the caller.
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

// 1. Save R4–R11 below the hardware frame, unless the exception was taken
//    from the main stack (kernel start).
// 2. Record the outgoing PSP and fetch the incoming one.
// 3. Restore R4–R11 and return to Thread mode on PSP.
core::arch::global_asm!(
    ".section .text.PendSV,\"ax\",%progbits",
    ".global PendSV",
    ".type PendSV,%function",
    ".thumb_func",
    "PendSV:",
    "    mrs r0, psp",
    "    tst lr, #4",
    "    beq 1f",
    "    stmdb r0!, {{r4-r11}}",
    "1:",
    "    bl edfos_switch_context",
    "    ldmia r0!, {{r4-r11}}",
    "    msr psp, r0",
    "    ldr r0, =0xFFFFFFFD",
    "    bx r0",
    "    .ltorg",
    ".size PendSV, . - PendSV",
);

/// Store the outgoing stack pointer and return the incoming one.
///
/// # Safety
/// Only called from `PendSV`, which runs at the lowest priority and so never
/// interrupts a masked kernel section.
#[no_mangle]
unsafe extern "C" fn edfos_switch_context(psp: *mut u32) -> *mut u32 {
    let sched = crate::kernel::instance().scheduler_mut();
    sched.save_context(psp);
    sched.load_context()
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// Kernel tick. Pends PendSV through the port if the tick changed the
/// current task.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::instance().tick();
}
