//! # EdfOS Configuration
//!
//! Compile-time constants governing the scheduler, the mailbox pools and
//! the hardware tick. All limits are fixed at compile time — every "allocation"
//! in the kernel is a slot taken from a statically sized pool.

/// Maximum number of tasks the system can manage simultaneously,
/// including the always-present idle task. Each task consumes
/// `STACK_SIZE` bytes of RAM.
pub const MAX_TASKS: usize = 8;

/// Per-task stack size in bytes. Must be large enough for the
/// deepest call chain plus the hardware exception frame (32 bytes)
/// and the software-saved context (32 bytes for R4–R11).
pub const STACK_SIZE: usize = 1024;

/// Maximum number of mailboxes alive at the same time.
pub const MAX_MAILBOXES: usize = 8;

/// Size of the message pool shared by all mailboxes. Data messages and
/// blocked-party placeholders both take one slot.
pub const MAX_MESSAGES: usize = 32;

/// Largest per-message payload a mailbox may be created with, in bytes.
pub const MAX_PAYLOAD: usize = 16;

/// Deadline given to the idle task. Nothing can be less urgent.
pub const IDLE_DEADLINE: u32 = u32::MAX;

/// SysTick frequency in Hz. One kernel tick per SysTick interrupt.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
