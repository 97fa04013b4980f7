//! # Architecture Abstraction Layer
//!
//! The kernel never saves registers, moves stack pointers or masks interrupts
//! itself. It calls the capabilities of a [`Port`] at fixed points of each
//! operation. The Cortex-M4 port implements them with PendSV and PRIMASK;
//! host tests use a counting mock.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(test)]
pub mod mock;

use crate::task::Tcb;

/// Hardware capabilities the kernel is driven through.
///
/// On real hardware `load_context_on_start` and `load_context_on_terminate`
/// never return. `context_switch` may defer the switch until interrupts are
/// unmasked; either way the caller continues only once its task has been
/// selected again.
pub trait Port {
    /// Enter a critical section: the tick handler cannot run until the
    /// matching [`unmask_interrupts`](Port::unmask_interrupts).
    fn mask_interrupts(&self);

    /// Leave the critical section entered by
    /// [`mask_interrupts`](Port::mask_interrupts).
    fn unmask_interrupts(&self);

    /// Build the first frame of a freshly created task so that loading its
    /// context starts `tcb.entry`. Sets `tcb.stack_pointer`.
    fn init_context(&self, tcb: &mut Tcb);

    /// Suspend the calling task and resume the scheduler's current task.
    fn context_switch(&self);

    /// Load the first task at kernel start; no context is saved and
    /// interrupts are re-enabled by the load.
    fn load_context_on_start(&self);

    /// Move execution off the stack of the task being terminated.
    fn switch_stack_to_next(&self);

    /// Load the current task after the caller has been terminated; no
    /// context is saved and interrupts are re-enabled by the load.
    fn load_context_on_terminate(&self);
}
