//! # EdfOS — Earliest-Deadline-First Operating System
//!
//! A preemptive real-time kernel for single-core ARM Cortex-M4
//! microcontrollers. Tasks carry absolute deadlines in ticks and the task
//! with the earliest deadline always runs. Tasks talk through bounded
//! mailboxes with blocking and non-blocking send and receive.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init · create_task · run · terminate · wait · ipc     │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Mailbox IPC      │  Sync Primitives  │
//! │  scheduler.rs│   ipc.rs           │  sync.rs          │
//! │  ─ tick()    │   ─ send_wait()    │  ─ enter / exit   │
//! │  ─ sleep()   │   ─ receive_wait() │                   │
//! │  ─ reselect()│   ─ *_no_wait()    │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │   Task model (task.rs) · Mailbox queue (mailbox.rs)     │
//! │        Ordered lists over slot pools (list.rs)          │
//! ├────────────────────────────────────────────────────────┤
//! │     Port trait (arch) · Cortex-M4 port (cortex_m4.rs)   │
//! │    PendSV · SysTick · Context Switch · Stack Init      │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Scheduling Model
//!
//! - **Ready** holds runnable tasks sorted by deadline; its head runs.
//! - **Waiting** holds tasks blocked on a mailbox, sorted by deadline.
//! - **Timer** holds sleeping tasks sorted by wake tick.
//!
//! Every blocking call reports [`Error::DeadlineReached`] when the caller's
//! deadline passed before it resumed. A task is never killed for missing its
//! deadline; it is told, and decides.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **No `alloc`**: pure `core` only
//! - **Slot pools**: tasks, mailboxes and messages live in fixed-size
//!   [`NodePool`](list::NodePool)s, so exhaustion is a plain [`Error::Fail`]
//! - **Per-task stack**: `[u8; STACK_SIZE]` inline in the TCB

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod list;
pub mod task;
pub mod mailbox;
pub mod scheduler;
pub mod ipc;
pub mod arch;
pub mod kernel;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod sync;

pub use error::{Error, Result};
pub use kernel::Kernel;
pub use mailbox::MailboxId;
pub use task::TaskId;
