//! # Synchronization Primitives
//!
//! Interrupt-safe critical sections for the Cortex-M4. Scheduler state is
//! shared between tasks and the SysTick/PendSV handlers, so every task-side
//! kernel operation runs between [`enter`] and [`exit`].
//!
//! The sections nest: only the outermost [`exit`] restores PRIMASK, and only
//! to the state found by the outermost [`enter`].

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use cortex_m::interrupt;
use cortex_m::register::primask;

static DEPTH: AtomicU32 = AtomicU32::new(0);

/// Whether interrupts were enabled when the outermost section was entered.
static WAS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Execute a closure with interrupts disabled, restoring them on exit.
///
/// Used for one-off setup outside the masked kernel paths.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}

/// Disable interrupts and open a (possibly nested) critical section.
#[inline]
pub fn enter() {
    let enabled = primask::read().is_inactive();
    interrupt::disable();
    if DEPTH.fetch_add(1, Ordering::Relaxed) == 0 {
        WAS_ENABLED.store(enabled, Ordering::Relaxed);
    }
}

/// Close the innermost critical section.
#[inline]
pub fn exit() {
    let depth = DEPTH.load(Ordering::Relaxed);
    if depth == 0 {
        return;
    }
    DEPTH.store(depth - 1, Ordering::Relaxed);
    if depth == 1 && WAS_ENABLED.load(Ordering::Relaxed) {
        unsafe { interrupt::enable() };
    }
}

/// Drop every open section and enable interrupts. Used by the one-way
/// context loads, which never return to the section that masked.
#[inline]
pub fn release() {
    DEPTH.store(0, Ordering::Relaxed);
    unsafe { interrupt::enable() };
}
