//! # Mailbox IPC
//!
//! The queue-mutation half of the four send/receive operations. Each function
//! runs with interrupts masked, leaves the queues consistent and raises the
//! scheduler's reschedule flag when a different task must run. Blocking calls
//! report [`Transfer::Blocked`]; the kernel then switches away and, once the
//! caller is resumed, finishes the call with [`Scheduler::finish_send`] or
//! [`Scheduler::finish_receive`] (plain [`Scheduler::resume_check`] when the
//! call completed without parking).
//!
//! ## Protocol
//!
//! A blocking send that finds a parked receiver hands the payload straight
//! into that receiver's TCB inbox and does not block. Otherwise the sender
//! parks behind a queued copy of its payload. A blocking receive takes the
//! oldest queued payload if there is one, releasing its sender if that sender
//! was parked; otherwise the receiver parks behind a placeholder.
//!
//! Nothing is mutated before every slot the call needs has been allocated, so
//! a [`Error::Fail`] from pool exhaustion leaves all queues untouched.

use crate::config::MAX_PAYLOAD;
use crate::error::{Error, Result};
use crate::mailbox::{Mailbox, MailboxId, Message, Party};
use crate::scheduler::Scheduler;
use crate::task::TaskId;

/// Outcome of the first half of a blocking send or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// The payload moved without the caller leaving Ready.
    Completed,
    /// The caller is parked in Waiting.
    Blocked,
}

impl Scheduler {
    /// Create a mailbox for up to `capacity` messages of `payload_size` bytes.
    pub fn create_mailbox(&mut self, capacity: usize, payload_size: usize) -> Result<MailboxId> {
        let mailbox = Mailbox::new(capacity, payload_size)?;
        let slot = self.mailboxes.alloc(mailbox)?;
        let id = MailboxId {
            slot,
            generation: self.generations[slot.index()],
        };
        debug!("mailbox {} created: {} x {} bytes", id, capacity, payload_size);
        Ok(id)
    }

    /// Destroy an empty mailbox.
    pub fn remove_mailbox(&mut self, mbox: MailboxId) -> Result<()> {
        if !self.mailbox(mbox)?.is_empty() {
            return Err(Error::NotEmpty);
        }
        self.mailboxes.release(mbox.slot);
        let generation = &mut self.generations[mbox.slot.index()];
        *generation = generation.wrapping_add(1);
        debug!("mailbox {} removed", mbox);
        Ok(())
    }

    /// A live mailbox.
    pub fn mailbox(&self, mbox: MailboxId) -> Result<&Mailbox> {
        let live = self.mailboxes.contains(mbox.slot)
            && self.generations[mbox.slot.index()] == mbox.generation;
        if !live {
            return Err(Error::Fail);
        }
        Ok(self.mailboxes.get(mbox.slot))
    }

    /// First half of a blocking send from the current task.
    pub fn send_wait(&mut self, mbox: MailboxId, data: &[u8]) -> Result<Transfer> {
        let me = self.current_task()?;
        self.mailbox(mbox)?.check_buffer(data)?;

        if self.hand_off(mbox, data) {
            return Ok(Transfer::Completed);
        }

        let len = self.mailboxes.get(mbox.slot).payload_size();
        let message = Message::with_payload(Party::Sender(me), data, len);
        let msg = self.mailboxes.get_mut(mbox.slot).push(&mut self.messages, message)?;

        let tcb = self.task_mut(me);
        tcb.pending = Some((mbox, msg));
        tcb.evicted = false;
        self.park(me);
        self.reselect();
        trace!("task {} blocked sending on mailbox {}", me, mbox);
        Ok(Transfer::Blocked)
    }

    /// First half of a blocking receive into `buf` by the current task.
    pub fn receive_wait(&mut self, mbox: MailboxId, buf: &mut [u8]) -> Result<Transfer> {
        let me = self.current_task()?;
        self.mailbox(mbox)?.check_buffer(buf)?;

        if self.take_queued(mbox, buf) {
            return Ok(Transfer::Completed);
        }

        let placeholder = Message::placeholder(Party::Receiver(me));
        let msg = self.mailboxes.get_mut(mbox.slot).push(&mut self.messages, placeholder)?;

        let tcb = self.task_mut(me);
        tcb.pending = Some((mbox, msg));
        tcb.delivered = false;
        self.park(me);
        self.reselect();
        trace!("task {} blocked receiving on mailbox {}", me, mbox);
        Ok(Transfer::Blocked)
    }

    /// Second half of a blocking receive that parked: copy out a handed-over
    /// payload, then apply the deadline check.
    pub fn finish_receive(&mut self, me: TaskId, mbox: MailboxId, buf: &mut [u8]) -> Result<()> {
        let tcb = self.task_mut(me);
        let delivered = core::mem::replace(&mut tcb.delivered, false);
        if delivered {
            let len = self
                .mailbox(mbox)
                .map_or(buf.len().min(MAX_PAYLOAD), Mailbox::payload_size);
            buf[..len].copy_from_slice(&self.task_mut(me).inbox[..len]);
        }
        self.resume_check(me)?;
        if delivered {
            Ok(())
        } else {
            Err(Error::Fail)
        }
    }

    /// Second half of a blocking send that parked: the deadline check, then
    /// `Fail` if the payload was evicted instead of received.
    pub fn finish_send(&mut self, me: TaskId) -> Result<()> {
        let evicted = core::mem::replace(&mut self.task_mut(me).evicted, false);
        self.resume_check(me)?;
        if evicted {
            Err(Error::Fail)
        } else {
            Ok(())
        }
    }

    /// Non-blocking send. A parked receiver gets the payload directly;
    /// otherwise it is queued, evicting the oldest entries until it fits.
    /// Parked senders may have pushed the queue past capacity, so more than
    /// one entry can go.
    pub fn send_no_wait(&mut self, mbox: MailboxId, data: &[u8]) -> Result<()> {
        self.mailbox(mbox)?.check_buffer(data)?;

        if self.hand_off(mbox, data) {
            return Ok(());
        }

        while self.mailboxes.get(mbox.slot).is_full() {
            let oldest = match self.mailboxes.get_mut(mbox.slot).pop(&mut self.messages) {
                Some(message) => message,
                None => break,
            };
            debug!("mailbox {} full, oldest entry evicted", mbox);
            if let Party::Sender(sender) = oldest.party {
                self.task_mut(sender).evicted = true;
                self.unpark(sender);
            }
        }
        self.reselect();

        let mailbox = self.mailboxes.get_mut(mbox.slot);
        let message = Message::with_payload(Party::Data, data, mailbox.payload_size());
        mailbox.push(&mut self.messages, message)?;
        Ok(())
    }

    /// Non-blocking receive. Fails without touching the mailbox when no
    /// payload is queued.
    pub fn receive_no_wait(&mut self, mbox: MailboxId, buf: &mut [u8]) -> Result<()> {
        self.mailbox(mbox)?.check_buffer(buf)?;
        if self.take_queued(mbox, buf) {
            Ok(())
        } else {
            Err(Error::Fail)
        }
    }

    /// Deliver `data` to a receiver parked at the head of `mbox`, if any.
    fn hand_off(&mut self, mbox: MailboxId, data: &[u8]) -> bool {
        let receiver = match self.mailboxes.get(mbox.slot).head_party(&self.messages) {
            Some(Party::Receiver(task)) => task,
            _ => return false,
        };

        let mailbox = self.mailboxes.get_mut(mbox.slot);
        let len = mailbox.payload_size();
        mailbox.pop(&mut self.messages);

        let tcb = self.task_mut(receiver);
        tcb.inbox[..len].copy_from_slice(&data[..len]);
        tcb.delivered = true;
        self.unpark(receiver);
        self.reselect();
        trace!("mailbox {}: handed off to task {}", mbox, receiver);
        true
    }

    /// Dequeue the oldest payload of `mbox` into `buf`, releasing its sender
    /// if it was parked. `false` when no payload is queued.
    fn take_queued(&mut self, mbox: MailboxId, buf: &mut [u8]) -> bool {
        let mailbox = self.mailboxes.get_mut(mbox.slot);
        match mailbox.head_party(&self.messages) {
            Some(Party::Data) | Some(Party::Sender(_)) => {}
            Some(Party::Receiver(_)) | None => return false,
        }
        let message = match mailbox.pop(&mut self.messages) {
            Some(message) => message,
            None => return false,
        };
        mailbox.deliver(&message, buf);

        if let Party::Sender(sender) = message.party {
            self.unpark(sender);
            self.reselect();
            trace!("mailbox {}: released sender {}", mbox, sender);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_MESSAGES;
    use crate::task::TaskState;

    extern "C" fn idle() {}
    extern "C" fn work() {}

    /// Running scheduler with tasks of the given deadlines, most urgent first
    /// in the returned array order.
    fn running(deadlines: &[u32]) -> (Scheduler, [TaskId; 4]) {
        let mut sched = Scheduler::new();
        let idle_id = sched.init(idle).unwrap();
        let mut ids = [idle_id; 4];
        for (slot, &d) in ids.iter_mut().zip(deadlines) {
            *slot = sched.create_task(work, d).unwrap();
        }
        sched.start().unwrap();
        (sched, ids)
    }

    #[test]
    fn test_mailbox_lifecycle() {
        let (mut sched, _) = running(&[10]);
        let mb = sched.create_mailbox(2, 4).unwrap();
        sched.send_no_wait(mb, &[1, 2, 3, 4]).unwrap();
        assert_eq!(sched.remove_mailbox(mb), Err(Error::NotEmpty));

        let mut buf = [0u8; 4];
        sched.receive_no_wait(mb, &mut buf).unwrap();
        assert_eq!(sched.remove_mailbox(mb), Ok(()));
        assert_eq!(sched.remove_mailbox(mb), Err(Error::Fail));
        assert_eq!(sched.send_no_wait(mb, &buf), Err(Error::Fail));
    }

    #[test]
    fn test_send_wait_blocks_without_receiver() {
        let (mut sched, [a, b, ..]) = running(&[5, 10]);
        let mb = sched.create_mailbox(4, 4).unwrap();

        assert_eq!(sched.send_wait(mb, &[9, 8, 7, 6]), Ok(Transfer::Blocked));
        assert!(sched.take_reschedule());
        assert_eq!(sched.current_task(), Ok(b));
        assert_eq!(sched.task(a).unwrap().state, TaskState::Waiting);

        let mailbox = sched.mailbox(mb).unwrap();
        assert_eq!(mailbox.len(), 1);
        assert_eq!(mailbox.blocked(), 1);
    }

    #[test]
    fn test_blocked_sender_released_by_receive_wait() {
        let (mut sched, [a, ..]) = running(&[5, 10]);
        let mb = sched.create_mailbox(4, 4).unwrap();
        sched.send_wait(mb, &[9, 8, 7, 6]).unwrap();
        sched.take_reschedule();

        let mut buf = [0u8; 4];
        assert_eq!(sched.receive_wait(mb, &mut buf), Ok(Transfer::Completed));
        assert_eq!(buf, [9, 8, 7, 6]);
        assert_eq!(sched.task(a).unwrap().state, TaskState::Ready);
        assert!(sched.task(a).unwrap().pending.is_none());
        // The released sender is more urgent than the receiver.
        assert!(sched.take_reschedule());
        assert_eq!(sched.current_task(), Ok(a));
        assert!(sched.mailbox(mb).unwrap().is_empty());
        assert_eq!(sched.mailbox(mb).unwrap().blocked(), 0);
        assert_eq!(sched.resume_check(a), Ok(()));
    }

    #[test]
    fn test_receive_wait_parks_and_send_wait_hands_off() {
        let (mut sched, [a, b, ..]) = running(&[5, 10]);
        let mb = sched.create_mailbox(4, 4).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(sched.receive_wait(mb, &mut buf), Ok(Transfer::Blocked));
        sched.take_reschedule();
        assert_eq!(sched.current_task(), Ok(b));
        let used = sched.messages.allocated();
        assert_eq!(used, 1);

        assert_eq!(sched.send_wait(mb, &[4, 3, 2, 1]), Ok(Transfer::Completed));
        // No message slot was taken for the hand-off.
        assert_eq!(sched.messages.allocated(), 0);
        assert!(sched.take_reschedule());
        assert_eq!(sched.current_task(), Ok(a));

        assert_eq!(sched.finish_receive(a, mb, &mut buf), Ok(()));
        assert_eq!(buf, [4, 3, 2, 1]);
        assert!(sched.mailbox(mb).unwrap().is_empty());
    }

    #[test]
    fn test_hand_off_to_less_urgent_receiver_does_not_switch() {
        let (mut sched, [a, b, ..]) = running(&[5, 10]);
        let mb = sched.create_mailbox(1, 2).unwrap();

        // Let b run and park as receiver, then make a the more urgent again.
        sched.set_deadline(20).unwrap();
        sched.take_reschedule();
        assert_eq!(sched.current_task(), Ok(b));

        let mut buf = [0u8; 2];
        sched.receive_wait(mb, &mut buf).unwrap();
        sched.take_reschedule();
        assert_eq!(sched.current_task(), Ok(a));
        sched.set_deadline(5).unwrap();
        assert!(!sched.take_reschedule());

        sched.send_no_wait(mb, &[1, 2]).unwrap();
        assert!(!sched.take_reschedule());
        assert_eq!(sched.current_task(), Ok(a));
        assert!(sched.task(b).unwrap().delivered);
    }

    #[test]
    fn test_send_no_wait_evicts_oldest() {
        let (mut sched, _) = running(&[10]);
        let mb = sched.create_mailbox(1, 4).unwrap();

        sched.send_no_wait(mb, b"msg1").unwrap();
        sched.send_no_wait(mb, b"msg2").unwrap();
        assert_eq!(sched.mailbox(mb).unwrap().len(), 1);

        let mut buf = [0u8; 4];
        sched.receive_no_wait(mb, &mut buf).unwrap();
        assert_eq!(&buf, b"msg2");
        assert!(sched.mailbox(mb).unwrap().is_empty());
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let (mut sched, _) = running(&[10]);
        let mb = sched.create_mailbox(3, 1).unwrap();
        for v in 0..4u8 {
            sched.send_no_wait(mb, &[v]).unwrap();
        }
        let mut got = [0u8; 3];
        for slot in got.iter_mut() {
            let mut buf = [0u8; 1];
            sched.receive_no_wait(mb, &mut buf).unwrap();
            *slot = buf[0];
        }
        assert_eq!(got, [1, 2, 3]);
    }

    #[test]
    fn test_eviction_releases_blocked_sender() {
        let (mut sched, [a, b, ..]) = running(&[5, 10]);
        let mb = sched.create_mailbox(1, 1).unwrap();
        sched.send_wait(mb, &[1]).unwrap();
        sched.take_reschedule();
        assert_eq!(sched.current_task(), Ok(b));

        sched.send_no_wait(mb, &[2]).unwrap();
        assert_eq!(sched.task(a).unwrap().state, TaskState::Ready);
        assert_eq!(sched.current_task(), Ok(a));
        assert_eq!(sched.mailbox(mb).unwrap().blocked(), 0);
        assert_eq!(sched.mailbox(mb).unwrap().len(), 1);

        // The sender learns its payload never reached a receiver.
        assert_eq!(sched.finish_send(a), Err(Error::Fail));
        assert_eq!(sched.finish_send(a), Ok(()));
        let mut buf = [0u8; 1];
        sched.receive_no_wait(mb, &mut buf).unwrap();
        assert_eq!(buf, [2]);
    }

    #[test]
    fn test_evicted_sender_past_deadline_reports_deadline() {
        let (mut sched, [a, ..]) = running(&[2, 10]);
        let mb = sched.create_mailbox(1, 1).unwrap();
        sched.send_wait(mb, &[1]).unwrap();
        sched.take_reschedule();
        sched.tick();

        sched.send_no_wait(mb, &[2]).unwrap();
        sched.tick();
        assert_eq!(sched.finish_send(a), Err(Error::DeadlineReached));
        assert!(!sched.task(a).unwrap().evicted);
    }

    #[test]
    fn test_eviction_restores_capacity_after_parked_senders() {
        let (mut sched, [a, b, c, _]) = running(&[5, 6, 10]);
        let mb = sched.create_mailbox(1, 1).unwrap();

        sched.send_wait(mb, &[1]).unwrap();
        sched.take_reschedule();
        assert_eq!(sched.current_task(), Ok(b));
        sched.send_wait(mb, &[2]).unwrap();
        sched.take_reschedule();
        assert_eq!(sched.current_task(), Ok(c));
        assert_eq!(sched.mailbox(mb).unwrap().len(), 2);

        sched.send_no_wait(mb, &[3]).unwrap();
        let mailbox = sched.mailbox(mb).unwrap();
        assert_eq!((mailbox.len(), mailbox.blocked()), (1, 0));
        assert_eq!(sched.current_task(), Ok(a));
        assert_eq!(sched.finish_send(a), Err(Error::Fail));
        assert_eq!(sched.finish_send(b), Err(Error::Fail));
        assert_eq!(sched.finish_send(c), Ok(()));

        let mut buf = [0u8; 1];
        sched.receive_no_wait(mb, &mut buf).unwrap();
        assert_eq!(buf, [3]);
    }

    #[test]
    fn test_removed_mailbox_handle_does_not_alias_new_one() {
        let (mut sched, _) = running(&[10]);
        let old = sched.create_mailbox(1, 1).unwrap();
        sched.remove_mailbox(old).unwrap();
        let new = sched.create_mailbox(1, 1).unwrap();
        assert_eq!(new.slot, old.slot);
        assert_ne!(new, old);

        assert_eq!(sched.send_no_wait(old, &[1]), Err(Error::Fail));
        assert_eq!(sched.remove_mailbox(old), Err(Error::Fail));
        assert!(sched.mailbox(new).unwrap().is_empty());
        sched.send_no_wait(new, &[2]).unwrap();
        assert_eq!(sched.mailbox(new).unwrap().len(), 1);
    }

    #[test]
    fn test_receive_no_wait_empty_leaves_counters() {
        let (mut sched, _) = running(&[10]);
        let mb = sched.create_mailbox(2, 2).unwrap();
        let mut buf = [7u8; 2];
        assert_eq!(sched.receive_no_wait(mb, &mut buf), Err(Error::Fail));
        assert_eq!(buf, [7, 7]);
        let mailbox = sched.mailbox(mb).unwrap();
        assert_eq!((mailbox.len(), mailbox.blocked()), (0, 0));
    }

    #[test]
    fn test_receive_no_wait_ignores_parked_receivers() {
        let (mut sched, _) = running(&[5, 10]);
        let mb = sched.create_mailbox(2, 2).unwrap();
        let mut buf = [0u8; 2];
        sched.receive_wait(mb, &mut buf).unwrap();
        sched.take_reschedule();

        assert_eq!(sched.receive_no_wait(mb, &mut buf), Err(Error::Fail));
        let mailbox = sched.mailbox(mb).unwrap();
        assert_eq!((mailbox.len(), mailbox.blocked()), (1, 1));
    }

    #[test]
    fn test_short_buffer_rejected_before_mutation() {
        let (mut sched, _) = running(&[5]);
        let mb = sched.create_mailbox(2, 4).unwrap();
        assert_eq!(sched.send_wait(mb, &[1, 2]), Err(Error::Fail));
        assert_eq!(sched.send_no_wait(mb, &[1]), Err(Error::Fail));
        assert!(sched.mailbox(mb).unwrap().is_empty());
        assert!(!sched.take_reschedule());
    }

    #[test]
    fn test_message_pool_exhaustion_keeps_sender_ready() {
        let (mut sched, [a, ..]) = running(&[5]);
        let big = sched.create_mailbox(MAX_MESSAGES, 1).unwrap();
        for _ in 0..MAX_MESSAGES {
            sched.send_no_wait(big, &[0]).unwrap();
        }
        let other = sched.create_mailbox(1, 1).unwrap();
        assert_eq!(sched.send_wait(other, &[1]), Err(Error::Fail));
        assert_eq!(sched.task(a).unwrap().state, TaskState::Ready);
        assert_eq!(sched.current_task(), Ok(a));
    }

    #[test]
    fn test_waiting_deadline_expiry_withdraws_entry() {
        let (mut sched, [a, ..]) = running(&[3, 10]);
        let mb = sched.create_mailbox(2, 2).unwrap();
        sched.send_wait(mb, &[1, 1]).unwrap();
        sched.take_reschedule();

        for _ in 0..3 {
            sched.tick();
        }
        assert_eq!(sched.task(a).unwrap().state, TaskState::Ready);
        assert_eq!(sched.current_task(), Ok(a));
        assert!(sched.mailbox(mb).unwrap().is_empty());
        assert_eq!(sched.resume_check(a), Err(Error::DeadlineReached));
    }

    #[test]
    fn test_waiting_scan_stops_at_first_pending_deadline() {
        let (mut sched, [a, b, c, _]) = running(&[2, 4, 9]);
        let mb = sched.create_mailbox(4, 1).unwrap();
        let mut buf = [0u8; 1];
        for _ in 0..3 {
            sched.receive_wait(mb, &mut buf).unwrap();
            sched.take_reschedule();
        }
        for _ in 0..4 {
            sched.tick();
        }
        let mut ready = sched.ready();
        assert_eq!(ready.next(), Some(a));
        assert_eq!(ready.next(), Some(b));
        assert_eq!(sched.task(c).unwrap().state, TaskState::Waiting);
        assert_eq!(sched.mailbox(mb).unwrap().blocked(), 1);
    }

    #[test]
    fn test_late_receiver_still_gets_payload() {
        let (mut sched, [a, ..]) = running(&[2, 10]);
        let mb = sched.create_mailbox(1, 1).unwrap();
        let mut buf = [0u8; 1];
        sched.receive_wait(mb, &mut buf).unwrap();
        sched.take_reschedule();
        sched.tick();
        sched.send_no_wait(mb, &[42]).unwrap();
        sched.tick();

        assert_eq!(sched.finish_receive(a, mb, &mut buf), Err(Error::DeadlineReached));
        assert_eq!(buf, [42]);
    }
}
