//! Debug assertion macros for queue invariants.
//!
//! Only active in debug builds (`debug_assert!`), so there is zero overhead
//! in release builds. They are placed where the invariant is sound to
//! check: quiescent points (teardown) and single-load-ordered snapshots.

/// Assert that the cursors are ordered: `tail ≤ head`.
///
/// Sound wherever `tail` was loaded before `head` (the pop cursor never
/// overtakes the push cursor, and both only increase).
macro_rules! debug_assert_cursor_order {
    ($tail:expr, $head:expr) => {
        debug_assert!(
            $tail <= $head,
            "cursor order violated: tail {} is ahead of head {}",
            $tail,
            $head
        )
    };
}

/// Assert that the resident count does not exceed capacity.
///
/// Sound at quiescent points, where both cursors are stable.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "resident count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// Assert that a slot being drained at teardown is occupied.
///
/// With all handles gone no push or pop can be in flight, so every slot in
/// `[tail, head)` must carry an initialized value.
macro_rules! debug_assert_drained_slot_occupied {
    ($state:expr, $seq:expr) => {
        debug_assert!(
            $state == $crate::slot::SlotState::Used as u32,
            "draining slot at sequence {} with state tag {} (expected occupied)",
            $seq,
            $state
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_cursor_order;
pub(crate) use debug_assert_drained_slot_occupied;
