//! # Mailbox Queue
//!
//! A mailbox is a bounded FIFO of fixed-size messages. Each queued entry is
//! either a data message waiting for a receiver or a placeholder standing for
//! a task parked on the mailbox (a blocked sender still carries its payload).
//!
//! Entries are nodes of the kernel-wide message pool; a mailbox only keeps the
//! list that threads its own entries together plus its counters. A queue is
//! never mixed: it holds parked receivers only, or data and parked senders
//! only, because a receiver parks only when nothing is queued and a sender
//! only when no receiver is parked.

use crate::config::MAX_PAYLOAD;
use crate::error::{Error, Result};
use crate::list::{List, NodeId, NodePool};
use crate::task::TaskId;

/// Handle of a mailbox in the scheduler's mailbox pool.
///
/// The generation is bumped every time the slot is freed, so a handle kept
/// past `remove_mailbox` stops resolving instead of aliasing the next
/// mailbox created in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MailboxId {
    pub(crate) slot: NodeId,
    pub(crate) generation: u16,
}

/// What a queued entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Party {
    /// Plain data from a non-blocking send.
    Data,
    /// A sender parked until its payload is taken.
    Sender(TaskId),
    /// A receiver parked until a payload is handed to it.
    Receiver(TaskId),
}

/// One mailbox entry.
#[derive(Clone, Copy)]
pub struct Message {
    pub party: Party,
    pub data: [u8; MAX_PAYLOAD],
}

impl Message {
    /// Entry carrying the first `len` bytes of `payload`.
    pub fn with_payload(party: Party, payload: &[u8], len: usize) -> Self {
        let mut data = [0u8; MAX_PAYLOAD];
        data[..len].copy_from_slice(&payload[..len]);
        Self { party, data }
    }

    /// Placeholder with no payload.
    pub const fn placeholder(party: Party) -> Self {
        Self {
            party,
            data: [0u8; MAX_PAYLOAD],
        }
    }

    /// Whether this entry represents a parked task rather than plain data.
    pub fn is_blocked_party(&self) -> bool {
        !matches!(self.party, Party::Data)
    }
}

/// Pool backing every mailbox's entries.
pub type MessagePool = NodePool<Message, { crate::config::MAX_MESSAGES }>;

/// Bounded FIFO channel for fixed-size messages.
pub struct Mailbox {
    queue: List,
    capacity: usize,
    payload_size: usize,
    blocked: usize,
}

impl Mailbox {
    /// New empty mailbox. `capacity` and `payload_size` must be non-zero and
    /// the payload must fit a message slot.
    pub fn new(capacity: usize, payload_size: usize) -> Result<Self> {
        if capacity == 0 || payload_size == 0 || payload_size > MAX_PAYLOAD {
            return Err(Error::Fail);
        }
        Ok(Self {
            queue: List::new(),
            capacity,
            payload_size,
            blocked: 0,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Number of queued entries, placeholders included.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    /// Number of queued entries that stand for parked tasks.
    #[inline]
    pub fn blocked(&self) -> usize {
        self.blocked
    }

    /// Oldest entry, if any.
    pub fn head(&self) -> Option<NodeId> {
        self.queue.head()
    }

    /// Party of the oldest entry, if any.
    pub fn head_party(&self, pool: &MessagePool) -> Option<Party> {
        self.queue.head().map(|id| pool.get(id).party)
    }

    /// Fails unless `buf` can hold one payload.
    pub fn check_buffer(&self, buf: &[u8]) -> Result<()> {
        if buf.len() < self.payload_size {
            return Err(Error::Fail);
        }
        Ok(())
    }

    /// Queue `message` at the tail. Fails, leaving everything untouched, when
    /// the message pool is exhausted.
    pub fn push(&mut self, pool: &mut MessagePool, message: Message) -> Result<NodeId> {
        let blocked = message.is_blocked_party();
        let id = pool.alloc(message)?;
        self.queue.push_back(pool, id);
        if blocked {
            self.blocked += 1;
        }
        Ok(id)
    }

    /// Dequeue the oldest entry and free its slot.
    pub fn pop(&mut self, pool: &mut MessagePool) -> Option<Message> {
        let id = self.queue.head()?;
        Some(self.withdraw(pool, id))
    }

    /// Remove a specific entry, wherever it sits in the queue.
    pub fn withdraw(&mut self, pool: &mut MessagePool, id: NodeId) -> Message {
        let message = self.queue.remove(pool, id);
        if message.is_blocked_party() {
            self.blocked -= 1;
        }
        message
    }

    /// Copy the payload part of `message` into `buf`.
    pub fn deliver(&self, message: &Message, buf: &mut [u8]) {
        buf[..self.payload_size].copy_from_slice(&message.data[..self.payload_size]);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_bad_geometry() {
        assert_eq!(Mailbox::new(0, 4).err(), Some(Error::Fail));
        assert_eq!(Mailbox::new(2, 0).err(), Some(Error::Fail));
        assert_eq!(Mailbox::new(2, MAX_PAYLOAD + 1).err(), Some(Error::Fail));
        assert!(Mailbox::new(2, MAX_PAYLOAD).is_ok());
    }

    #[test]
    fn test_fifo_order_and_counters() {
        let mut pool = MessagePool::new();
        let mut mb = Mailbox::new(4, 4).unwrap();

        mb.push(&mut pool, Message::with_payload(Party::Data, &[1, 1, 1, 1], 4)).unwrap();
        mb.push(&mut pool, Message::with_payload(Party::Data, &[2, 2, 2, 2], 4)).unwrap();
        assert_eq!(mb.len(), 2);
        assert_eq!(mb.blocked(), 0);

        let mut buf = [0u8; 4];
        let first = mb.pop(&mut pool).unwrap();
        mb.deliver(&first, &mut buf);
        assert_eq!(buf, [1, 1, 1, 1]);
        assert_eq!(mb.len(), 1);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn test_placeholders_count_as_blocked() {
        let mut pool = MessagePool::new();
        let mut mb = Mailbox::new(2, 4).unwrap();
        let task = {
            let mut tasks: NodePool<u8, 1> = NodePool::new();
            tasks.alloc(0).unwrap()
        };

        let id = mb.push(&mut pool, Message::placeholder(Party::Receiver(task))).unwrap();
        assert_eq!(mb.blocked(), 1);
        assert_eq!(mb.head_party(&pool), Some(Party::Receiver(task)));

        mb.withdraw(&mut pool, id);
        assert_eq!(mb.blocked(), 0);
        assert!(mb.is_empty());
        assert_eq!(mb.head_party(&pool), None);
    }

    #[test]
    fn test_push_fails_cleanly_when_pool_exhausted() {
        let mut pool = MessagePool::new();
        let mut mb = Mailbox::new(usize::MAX, 1).unwrap();
        for _ in 0..crate::config::MAX_MESSAGES {
            mb.push(&mut pool, Message::placeholder(Party::Data)).unwrap();
        }
        let before = mb.len();
        assert_eq!(mb.push(&mut pool, Message::placeholder(Party::Data)), Err(Error::Fail));
        assert_eq!(mb.len(), before);
    }

    #[test]
    fn test_buffer_check() {
        let mb = Mailbox::new(1, 4).unwrap();
        assert_eq!(mb.check_buffer(&[0u8; 3]), Err(Error::Fail));
        assert!(mb.check_buffer(&[0u8; 4]).is_ok());
        assert!(mb.check_buffer(&[0u8; 8]).is_ok());
    }
}
