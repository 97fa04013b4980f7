//! # EdfOS Example Firmware
//!
//! Four tasks on one mailbox-connected board:
//!
//! | Task | Initial deadline | Behavior |
//! |------|------------------|----------|
//! | `sampler` | 5 | Sleeps 3 ticks, then re-arms its deadline every period |
//! | `reporter` | 10 | One-shot: does a little work, then returns |
//! | `producer` | 40 | Sends a counter every 20 ticks without blocking |
//! | `consumer` | 50 | Blocks on the mailbox and tracks deadline misses |
//!
//! ## Expected Timeline
//!
//! 1. `sampler` runs first (earliest deadline) and sleeps at tick 0.
//! 2. `reporter` runs, finishes and is terminated by the exit trampoline.
//! 3. At tick 3 `sampler` wakes and, still the most urgent, preempts
//!    whatever runs.
//! 4. `consumer` parks on the mailbox; each `producer` send hands the
//!    counter straight to it.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use edfos::kernel;
use edfos::{Error, MailboxId};

/// Mailbox shared by `producer` and `consumer`, set before the kernel starts.
static mut CHANNEL: Option<MailboxId> = None;

fn channel() -> Option<MailboxId> {
    unsafe { *core::ptr::addr_of!(CHANNEL) }
}

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Periodic sampling task with a 20-tick period.
extern "C" fn sampler() {
    const PERIOD: u32 = 20;
    let mut _late: u32 = 0;

    if kernel::wait(3) == Err(Error::DeadlineReached) {
        _late += 1;
    }
    loop {
        // Simulated sensor read
        let mut work: u32 = 0;
        for _ in 0..2000 {
            work = work.wrapping_add(1);
        }

        // Due by the end of the next period
        let _ = kernel::set_deadline(kernel::ticks().wrapping_add(2 * PERIOD));
        if kernel::wait(PERIOD) == Err(Error::DeadlineReached) {
            _late += 1;
        }
    }
}

/// One-shot task. Returning hands it to the exit trampoline.
extern "C" fn reporter() {
    let mut _checksum: u32 = 0;
    for i in 0..500u32 {
        _checksum = _checksum.wrapping_add(i);
    }
}

extern "C" fn producer() {
    const PERIOD: u32 = 20;
    let Some(mbox) = channel() else { return };
    let mut counter: u32 = 0;
    loop {
        let _ = kernel::send_no_wait(mbox, &counter.to_le_bytes());
        counter = counter.wrapping_add(1);

        let _ = kernel::set_deadline(kernel::ticks().wrapping_add(2 * PERIOD));
        let _ = kernel::wait(PERIOD);
    }
}

extern "C" fn consumer() {
    let Some(mbox) = channel() else { return };
    let mut buf = [0u8; 4];
    let mut _last: u32 = 0;
    let mut _missed: u32 = 0;
    loop {
        match kernel::receive_wait(mbox, &mut buf) {
            Ok(()) => _last = u32::from_le_bytes(buf),
            Err(Error::DeadlineReached) => _missed += 1,
            Err(_) => {}
        }
        let _ = kernel::set_deadline(kernel::ticks().wrapping_add(50));
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Initializes the kernel, creates the mailbox and the
/// tasks, and starts scheduling. Does not return.
#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    kernel::init().expect("kernel init failed");

    let mbox = kernel::create_mailbox(4, 4).expect("Failed to create mailbox");
    unsafe { *core::ptr::addr_of_mut!(CHANNEL) = Some(mbox) };

    kernel::create_task(reporter, 10).expect("Failed to create reporter");
    kernel::create_task(sampler, 5).expect("Failed to create sampler");
    kernel::create_task(producer, 40).expect("Failed to create producer");
    kernel::create_task(consumer, 50).expect("Failed to create consumer");

    // Start the scheduler — does not return
    kernel::start(cp)
}
