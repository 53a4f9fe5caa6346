use crate::invariants::{
    debug_assert_bounded_count, debug_assert_cursor_order, debug_assert_drained_slot_occupied,
};
use crate::ops::{BitwiseOps, ValueOps};
use crate::slot::{Slot, SlotState};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// SYNCHRONIZATION PROTOCOL
// =============================================================================
//
// This MPMC queue synchronizes producers against producers, consumers against
// consumers, and producers against consumers with two mechanisms:
//
// ## Sequence cursors
//
// `head` (next push target) and `tail` (next pop target) are unbounded u64
// sequence numbers, not wrapping indices. A slot's logical index is
// `seq % capacity`, computed only at access time. Unbounded sequences remove
// the ABA problem from the cursor CASes: at a billion operations per second,
// wrap-around takes centuries. Both cursors are monotonically non-decreasing
// and only ever advance by CAS, so `tail ≤ head ≤ tail + capacity` at every
// consistent observation point.
//
// ## Per-slot state machine
//
// Each slot carries a four-state tag (see `slot.rs`). A producer must win
// the `NotUsed → Pushing` CAS on the head slot *before* it may CAS `head`
// forward; a consumer must win `Used → Popping` on the tail slot before it
// may CAS `tail` forward. The slot claim coming first is load-bearing: were
// the cursor advanced first, a second producer could lap onto a slot still
// owned by a consumer from the previous round.
//
// Losing the cursor CAS after winning the slot claim reverts the tag with a
// plain store (the loser still owns the slot until it gives it up), then
// retries from the top. Every retry is caused by another thread's completed
// cursor advance, so the queue is lock-free: some thread always makes
// progress.
//
// ## Memory ordering
//
// All tag and cursor operations use sequentially consistent ordering. A
// relaxation is possible: the value write must happen-before the
// `Pushing → Used` publish observed by a consumer (Release/Acquire pair),
// and symmetrically for the `Popping → NotUsed` publish observed by a
// producer. The hot-path cost on x86 is a single ordered store per
// operation, and SeqCst keeps the cursor/tag interleavings reasoned about
// in one total order.
//
// =============================================================================

/// Error returned by [`SlotQueue::new`] and [`SlotQueue::with_ops`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CreateError {
    /// The requested capacity was zero.
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,
}

/// Error returned by [`SlotQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// The queue holds `capacity` values. Expected flow control under
    /// load, not a failure; the caller retries or backs off.
    #[error("queue is full")]
    QueueFull,
}

/// Error returned by [`SlotQueue::pop`] and [`SlotQueue::pop_if`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    /// The queue holds no values. Expected flow control, not a failure.
    #[error("queue is empty")]
    QueueEmpty,
    /// The predicate declined the head-of-queue value; nothing was
    /// consumed.
    #[error("pop rejected by predicate")]
    Rejected,
}

struct Core<T, O: ValueOps<T>> {
    /// Next push target (sequence number, not an index).
    head: CachePadded<AtomicU64>,
    /// Next pop target.
    tail: CachePadded<AtomicU64>,
    /// The ring. Fixed at construction; the queue never allocates again.
    slots: Box<[Slot<T>]>,
    capacity: u64,
    ops: O,
}

// Safety: slot storage is `UnsafeCell`, but mutation rights are governed by
// the claim protocol above. At most one thread owns a slot's value field at
// any time, and the hooks are `Send + Sync` by trait bound.
unsafe impl<T: Send, O: ValueOps<T>> Send for Core<T, O> {}
unsafe impl<T: Send, O: ValueOps<T>> Sync for Core<T, O> {}

/// A shared handle to a bounded, lock-free MPMC typed queue.
///
/// Any number of threads may [`push`](Self::push) and [`pop`](Self::pop)
/// concurrently through clones of the same handle. Operations never block:
/// they return [`PushError::QueueFull`] / [`PopError::QueueEmpty`]
/// immediately instead of waiting.
///
/// Cloning a handle only bumps a reference count; the ring itself is shared.
/// When the last handle drops, values still resident in the queue are
/// drained through [`ValueOps::dispose`], oldest first.
///
/// FIFO order is guaranteed with exactly one producer and one consumer.
/// With more than one of either, each slot transition is still atomic, but
/// racing producers (or consumers) may interleave, so the global pop order
/// can differ from the push order.
pub struct SlotQueue<T, O: ValueOps<T> = BitwiseOps> {
    core: Arc<Core<T, O>>,
}

impl<T: Copy> SlotQueue<T, BitwiseOps> {
    /// Creates a hook-less queue of `Copy` elements with room for
    /// `capacity` values.
    pub fn new(capacity: u32) -> Result<Self, CreateError> {
        Self::with_ops(capacity, BitwiseOps)
    }
}

impl<T, O: ValueOps<T>> SlotQueue<T, O> {
    /// Creates a queue whose values cross slot boundaries through `ops`.
    ///
    /// On success the queue is empty, every slot unoccupied, and the
    /// returned handle is the sole reference. Fails only on zero capacity;
    /// nothing is allocated on the failure path.
    pub fn with_ops(capacity: u32, ops: O) -> Result<Self, CreateError> {
        if capacity == 0 {
            return Err(CreateError::ZeroCapacity);
        }

        // Fixed-size ring as a boxed slice; capacity is arbitrary (no
        // power-of-two requirement), indices are taken modulo capacity.
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, Slot::new);

        Ok(Self {
            core: Arc::new(Core {
                head: CachePadded::new(AtomicU64::new(0)),
                tail: CachePadded::new(AtomicU64::new(0)),
                slots: slots.into_boxed_slice(),
                capacity: u64::from(capacity),
                ops,
            }),
        })
    }

    /// Returns the fixed capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.core.capacity as usize
    }

    /// Returns a snapshot of the number of resident values.
    ///
    /// Under concurrent pushes and pops this is approximate by the time the
    /// caller observes it.
    #[inline]
    pub fn len(&self) -> usize {
        self.core.len()
    }

    /// Returns true if the snapshot count is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attempts to enqueue a copy of `value`.
    ///
    /// `context` is forwarded verbatim to [`ValueOps::copy_in`]; the caller
    /// retains ownership of `value`. Returns [`PushError::QueueFull`]
    /// immediately when `capacity` values are resident.
    #[inline]
    pub fn push(&self, value: &T, context: &O::PushContext) -> Result<(), PushError> {
        self.core.push(value, context)
    }

    /// Attempts to dequeue the oldest value.
    ///
    /// `context` is forwarded verbatim to [`ValueOps::move_out`]. Returns
    /// [`PopError::QueueEmpty`] immediately when no value is resident.
    #[inline]
    pub fn pop(&self, context: &O::PopContext) -> Result<T, PopError> {
        self.core.pop_if(context, &mut |_| true)
    }

    /// Attempts to dequeue the oldest value, letting `predicate` inspect it
    /// first.
    ///
    /// The predicate runs after the slot has been claimed (so the inspected
    /// value cannot change underneath it) and before the pop commits.
    /// Returning `false` aborts the pop: the value stays at the head of the
    /// queue and [`PopError::Rejected`] is returned with nothing consumed.
    ///
    /// If another consumer wins the commit race, the claim is retried and
    /// the predicate runs again, possibly on a different value, so it
    /// should be side-effect-free or idempotent.
    #[inline]
    pub fn pop_if<P>(&self, context: &O::PopContext, mut predicate: P) -> Result<T, PopError>
    where
        P: FnMut(&T) -> bool,
    {
        self.core.pop_if(context, &mut predicate)
    }
}

impl<T, O: ValueOps<T>> Clone for SlotQueue<T, O> {
    /// Creates another handle to the same queue.
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T, O: ValueOps<T>> Core<T, O> {
    #[inline]
    fn slot(&self, seq: u64) -> &Slot<T> {
        &self.slots[(seq % self.capacity) as usize]
    }

    fn len(&self) -> usize {
        // Load order matters: reading `tail` first guarantees the later
        // `head` read is at least as fresh, so the difference is never
        // negative. It can transiently overshoot while `tail` advances,
        // hence the clamp.
        let tail = self.tail.load(Ordering::SeqCst);
        let head = self.head.load(Ordering::SeqCst);
        debug_assert_cursor_order!(tail, head);
        head.wrapping_sub(tail).min(self.capacity) as usize
    }

    fn push(&self, value: &T, context: &O::PushContext) -> Result<(), PushError> {
        loop {
            let head = self.head.load(Ordering::SeqCst);
            let tail = self.tail.load(Ordering::SeqCst);

            // Best-effort full check: a false positive is impossible (the
            // observed cursors really did span >= capacity entries), and a
            // false negative just fails a claim below and retries.
            if head.wrapping_sub(tail) >= self.capacity {
                return Err(PushError::QueueFull);
            }

            let slot = self.slot(head);

            // Claim the slot before touching the cursor; see the protocol
            // notes at the top of this file for why this order is required.
            if !slot.try_claim(SlotState::NotUsed, SlotState::Pushing) {
                continue;
            }

            if self
                .head
                .compare_exchange(
                    head,
                    head.wrapping_add(1),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_err()
            {
                // Another producer advanced head first; give the slot back.
                slot.set_state(SlotState::NotUsed);
                continue;
            }

            // SAFETY: this thread won both the slot claim and the cursor
            // advance; it is the sole owner of the (empty) value storage
            // until the publish below.
            unsafe { slot.write(self.ops.copy_in(context, value)) };
            slot.set_state(SlotState::Used);
            return Ok(());
        }
    }

    fn pop_if<P>(&self, context: &O::PopContext, predicate: &mut P) -> Result<T, PopError>
    where
        P: FnMut(&T) -> bool,
    {
        loop {
            let head = self.head.load(Ordering::SeqCst);
            let tail = self.tail.load(Ordering::SeqCst);

            if head == tail {
                return Err(PopError::QueueEmpty);
            }

            let slot = self.slot(tail);

            if !slot.try_claim(SlotState::Used, SlotState::Popping) {
                continue;
            }

            // SAFETY: the claim pinned the slot in `Popping`; the value is
            // initialized and no other thread may touch it.
            if !predicate(unsafe { slot.value_ref() }) {
                // Put the value back at the head of the queue, untouched.
                slot.set_state(SlotState::Used);
                return Err(PopError::Rejected);
            }

            if self
                .tail
                .compare_exchange(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_err()
            {
                // Another consumer advanced tail first; a retry will claim
                // a fresh slot and consult the predicate again.
                slot.set_state(SlotState::Used);
                continue;
            }

            // SAFETY: sole owner of the initialized value; `take` leaves
            // the storage logically empty for the next producer round.
            let value = self.ops.move_out(context, unsafe { slot.take() });
            slot.set_state(SlotState::NotUsed);
            return Ok(value);
        }
    }
}

impl<T, O: ValueOps<T>> Drop for Core<T, O> {
    /// Drains residual values once the last handle is gone.
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        debug_assert_cursor_order!(tail, head);
        debug_assert_bounded_count!(head.wrapping_sub(tail), self.capacity);

        let mut seq = tail;
        while seq != head {
            let idx = (seq % self.capacity) as usize;
            let slot = &mut self.slots[idx];
            debug_assert_drained_slot_occupied!(slot.state_mut(), seq);

            // SAFETY: no handle outlives this core, so no push or pop is in
            // flight; every slot in [tail, head) holds an initialized value
            // and is read exactly once here.
            let value = unsafe { slot.take_mut() };
            self.ops.dispose(value);
            seq = seq.wrapping_add(1);
        }
    }
}
