//! # Ordered Node List
//!
//! A doubly-linked list whose nodes live in a fixed-size arena ([`NodePool`])
//! and are addressed by stable [`NodeId`] handles. The same container backs the
//! three task queues (Ready, Waiting, Timer) and every mailbox FIFO.
//!
//! A node is allocated once, then unlinked and relinked between lists any
//! number of times without moving: relocating a task from Ready to Waiting is
//! an index swap, never a copy.
//!
//! ## Invariants
//!
//! - An empty list has no head and no tail.
//! - A one-element list has `head == tail`.
//! - A node belongs to at most one list; an unlinked node has no links.
//! - [`List::insert_sorted`] keeps the list ascending under the comparator and
//!   places a new node after every node it compares equal to (FIFO on ties).

use core::cmp::Ordering;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Node handles and storage
// ---------------------------------------------------------------------------

/// Stable handle to a slot in a [`NodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeId(u16);

impl NodeId {
    /// Slot index inside the owning pool.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

struct Node<T> {
    prev: Option<NodeId>,
    next: Option<NodeId>,
    payload: T,
}

/// Fixed-capacity arena of list nodes. Allocation failure is reported as
/// [`Error::Fail`] and never touches any list.
pub struct NodePool<T, const N: usize> {
    slots: [Option<Node<T>>; N],
}

impl<T, const N: usize> NodePool<T, N> {
    const VACANT: Option<Node<T>> = None;

    /// Create an empty pool.
    pub const fn new() -> Self {
        Self {
            slots: [Self::VACANT; N],
        }
    }

    /// Take a free slot for `payload`. The new node is unlinked.
    pub fn alloc(&mut self, payload: T) -> Result<NodeId> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::Fail)?;
        self.slots[index] = Some(Node {
            prev: None,
            next: None,
            payload,
        });
        Ok(NodeId(index as u16))
    }

    /// Free a slot and hand back its payload. The node must already be
    /// unlinked from every list.
    pub fn release(&mut self, id: NodeId) -> T {
        debug_assert!(self.is_detached(id), "releasing a linked node");
        match self.slots[id.index()].take() {
            Some(node) => node.payload,
            None => panic!("stale node handle {}", id.0),
        }
    }

    /// Whether `id` refers to an allocated slot.
    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.get(id.index()).map_or(false, Option::is_some)
    }

    /// Number of allocated slots.
    pub fn allocated(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn get(&self, id: NodeId) -> &T {
        &self.node(id).payload
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.node_mut(id).payload
    }

    /// Successor of `id` in whatever list it is linked into.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).next
    }

    /// Predecessor of `id` in whatever list it is linked into.
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).prev
    }

    fn is_detached(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.prev.is_none() && node.next.is_none()
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        match &self.slots[id.index()] {
            Some(node) => node,
            None => panic!("stale node handle {}", id.0),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        match &mut self.slots[id.index()] {
            Some(node) => node,
            None => panic!("stale node handle {}", id.0),
        }
    }
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Head/tail pair over nodes stored in a [`NodePool`].
///
/// The list does not own its pool; every operation borrows the pool the nodes
/// were allocated from. Mixing pools is a logic error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct List {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl List {
    /// Create an empty list.
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    #[inline]
    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Detach every node. Nodes stay allocated in the pool; callers still
    /// holding their handles own them.
    pub fn clear<T, const N: usize>(&mut self, pool: &mut NodePool<T, N>) {
        while self.pop_front(pool).is_some() {}
    }

    /// Link an unlinked node before the first node that compares greater
    /// than it, or at the tail.
    pub fn insert_sorted<T, const N: usize, F>(&mut self, pool: &mut NodePool<T, N>, id: NodeId, cmp: F)
    where
        F: Fn(&T, &T) -> Ordering,
    {
        debug_assert!(pool.is_detached(id) && self.head != Some(id));

        let mut cursor = self.head;
        while let Some(at) = cursor {
            if cmp(pool.get(id), pool.get(at)) == Ordering::Less {
                self.link_before(pool, id, at);
                return;
            }
            cursor = pool.next(at);
        }
        self.push_back(pool, id);
    }

    /// Link an unlinked node at the tail.
    pub fn push_back<T, const N: usize>(&mut self, pool: &mut NodePool<T, N>, id: NodeId) {
        debug_assert!(pool.is_detached(id) && self.head != Some(id));

        match self.tail {
            Some(tail) => {
                pool.node_mut(tail).next = Some(id);
                pool.node_mut(id).prev = Some(tail);
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    /// Link an unlinked node at the head.
    pub fn push_front<T, const N: usize>(&mut self, pool: &mut NodePool<T, N>, id: NodeId) {
        match self.head {
            Some(head) => self.link_before(pool, id, head),
            None => self.push_back(pool, id),
        }
    }

    /// Unlink and return the head node.
    pub fn pop_front<T, const N: usize>(&mut self, pool: &mut NodePool<T, N>) -> Option<NodeId> {
        let head = self.head?;
        self.unlink(pool, head);
        Some(head)
    }

    /// Unlink `id` from this list without freeing it. Its links are cleared so
    /// it can be inserted elsewhere straight away.
    pub fn unlink<T, const N: usize>(&mut self, pool: &mut NodePool<T, N>, id: NodeId) {
        let (prev, next) = {
            let node = pool.node(id);
            (node.prev, node.next)
        };
        debug_assert!(prev.is_some() || self.head == Some(id), "node is not in this list");

        match prev {
            Some(p) => pool.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => pool.node_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let node = pool.node_mut(id);
        node.prev = None;
        node.next = None;
        self.len -= 1;
    }

    /// Unlink `id`, free its slot and return the payload.
    pub fn remove<T, const N: usize>(&mut self, pool: &mut NodePool<T, N>, id: NodeId) -> T {
        self.unlink(pool, id);
        pool.release(id)
    }

    /// First node (from the head) whose payload satisfies `pred`.
    pub fn find<T, const N: usize, F>(&self, pool: &NodePool<T, N>, mut pred: F) -> Option<NodeId>
    where
        F: FnMut(&T) -> bool,
    {
        self.iter(pool).find(|&id| pred(pool.get(id)))
    }

    /// Head-to-tail traversal of node handles.
    pub fn iter<'a, T, const N: usize>(&self, pool: &'a NodePool<T, N>) -> Iter<'a, T, N> {
        Iter {
            pool,
            cursor: self.head,
        }
    }

    fn link_before<T, const N: usize>(&mut self, pool: &mut NodePool<T, N>, id: NodeId, at: NodeId) {
        let prev = pool.node(at).prev;
        {
            let node = pool.node_mut(id);
            node.prev = prev;
            node.next = Some(at);
        }
        pool.node_mut(at).prev = Some(id);
        match prev {
            Some(p) => pool.node_mut(p).next = Some(id),
            None => self.head = Some(id),
        }
        self.len += 1;
    }
}

/// Iterator over the handles of a [`List`], head first.
pub struct Iter<'a, T, const N: usize> {
    pool: &'a NodePool<T, N>,
    cursor: Option<NodeId>,
}

impl<T, const N: usize> Iterator for Iter<'_, T, N> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cursor?;
        self.cursor = self.pool.next(id);
        Some(id)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
