use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};

/// Occupancy tag for one ring cell.
///
/// Transitions (see the protocol notes in `queue.rs`):
///
/// | From     | To       | Driver                                  |
/// |----------|----------|-----------------------------------------|
/// | NotUsed  | Pushing  | producer CAS (slot claim)               |
/// | Pushing  | NotUsed  | producer revert (head CAS lost)         |
/// | Pushing  | Used     | producer publish                        |
/// | Used     | Popping  | consumer CAS (slot claim)               |
/// | Popping  | Used     | consumer revert (rejected/tail CAS lost)|
/// | Popping  | NotUsed  | consumer publish                        |
///
/// Only the two claim transitions are contended; every other transition is
/// a plain store by the thread that currently owns the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum SlotState {
    NotUsed = 0,
    Pushing = 1,
    Used = 2,
    Popping = 3,
}

/// One cell of the ring: an atomic state tag plus storage for one value.
///
/// The value is initialized exactly while the tag is `Used` or `Popping`.
/// Mutation rights over `value` follow the tag: the thread that won the
/// `NotUsed → Pushing` claim owns it until it publishes `Used`; the thread
/// that won `Used → Popping` owns it until it publishes `NotUsed` or
/// reverts to `Used`.
pub(crate) struct Slot<T> {
    state: AtomicU32,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU32::new(SlotState::NotUsed as u32),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// CAS the tag from `current` to `next`. This is the only contended
    /// write to the tag; both queue-level claim transitions go through it.
    #[inline]
    pub(crate) fn try_claim(&self, current: SlotState, next: SlotState) -> bool {
        self.state
            .compare_exchange(
                current as u32,
                next as u32,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Plain store of the tag. Callers must own the slot per the claim
    /// protocol; publish and revert transitions are never contended.
    #[inline]
    pub(crate) fn set_state(&self, next: SlotState) {
        self.state.store(next as u32, Ordering::SeqCst);
    }

    /// Raw tag value, for quiescent (single-owner) inspection.
    pub(crate) fn state_mut(&mut self) -> u32 {
        *self.state.get_mut()
    }

    /// Write a value into the cell.
    ///
    /// # Safety
    ///
    /// The caller must own the slot in `Pushing` state, so no other thread
    /// reads or writes the storage, and the storage must currently be empty.
    #[inline]
    pub(crate) unsafe fn write(&self, value: T) {
        (*self.value.get()).write(value);
    }

    /// Borrow the value in the cell.
    ///
    /// # Safety
    ///
    /// The caller must own the slot in `Popping` state; the value is
    /// initialized in that state and no other thread may touch it.
    #[inline]
    pub(crate) unsafe fn value_ref(&self) -> &T {
        (*self.value.get()).assume_init_ref()
    }

    /// Move the value out of the cell, leaving it logically empty.
    ///
    /// # Safety
    ///
    /// The caller must own the slot in `Popping` state and must not read
    /// the storage again before the next `write`.
    #[inline]
    pub(crate) unsafe fn take(&self) -> T {
        (*self.value.get()).assume_init_read()
    }

    /// Move the value out during teardown, when no other thread can hold
    /// a reference to the queue.
    ///
    /// # Safety
    ///
    /// The slot must be in `Used` state (its storage initialized) and must
    /// not be read again.
    pub(crate) unsafe fn take_mut(&mut self) -> T {
        self.value.get_mut().assume_init_read()
    }
}
