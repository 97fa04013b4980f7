//! Counting port for host tests. Every capability returns immediately, which
//! models the calling task being selected again at once. Both one-way loads
//! leave interrupts unmasked, as the hardware loads do.

use core::cell::Cell;

use super::Port;
use crate::task::Tcb;

#[derive(Default)]
pub struct MockPort {
    /// Current critical-section nesting.
    pub depth: Cell<u32>,
    /// Deepest nesting seen.
    pub max_depth: Cell<u32>,
    pub masks: Cell<u32>,
    pub unmasks: Cell<u32>,
    pub frames: Cell<u32>,
    pub switches: Cell<u32>,
    pub starts: Cell<u32>,
    pub stack_moves: Cell<u32>,
    pub terminations: Cell<u32>,
    /// Switches requested while interrupts were unmasked.
    pub unmasked_switches: Cell<u32>,
}

fn bump(counter: &Cell<u32>) {
    counter.set(counter.get() + 1);
}

impl Port for MockPort {
    fn mask_interrupts(&self) {
        bump(&self.masks);
        bump(&self.depth);
        if self.depth.get() > self.max_depth.get() {
            self.max_depth.set(self.depth.get());
        }
    }

    fn unmask_interrupts(&self) {
        assert!(self.depth.get() > 0, "unmask without mask");
        bump(&self.unmasks);
        self.depth.set(self.depth.get() - 1);
    }

    fn init_context(&self, tcb: &mut Tcb) {
        bump(&self.frames);
        tcb.stack_pointer = tcb.stack.top().cast();
    }

    fn context_switch(&self) {
        bump(&self.switches);
        if self.depth.get() == 0 {
            bump(&self.unmasked_switches);
        }
    }

    fn load_context_on_start(&self) {
        bump(&self.starts);
        self.depth.set(0);
    }

    fn switch_stack_to_next(&self) {
        bump(&self.stack_moves);
    }

    fn load_context_on_terminate(&self) {
        bump(&self.terminations);
        self.depth.set(0);
    }
}
