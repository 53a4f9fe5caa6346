//! slotq - Bounded Lock-Free Multi-Producer Multi-Consumer Typed Queue
//!
//! A fixed-capacity ring where every cell carries its own four-state tag
//! driven purely by compare-and-swap, coordinated by two 64-bit sequence
//! cursors. Any number of threads can push and pop concurrently; operations
//! never block and report full/empty immediately.
//!
//! # Key Features
//!
//! - Per-slot state machine: producers and consumers contend on slot claims,
//!   not on a shared lock
//! - 64-bit sequence cursors (no ABA on cursor CASes)
//! - Pluggable value lifecycle hooks ([`ValueOps`]) for reference-counted
//!   payloads, with drain-on-last-drop
//! - Conditional pop: a predicate may inspect and decline the head value
//!   without consuming it
//!
//! # Example
//!
//! ```
//! use slotq::SlotQueue;
//!
//! let queue = SlotQueue::<u64>::new(16).unwrap();
//! let handle = queue.clone();
//!
//! queue.push(&42, &()).unwrap();
//!
//! // A predicate can look before consuming.
//! assert!(handle.pop_if(&(), |v| *v > 100).is_err());
//! assert_eq!(handle.pop(&()).unwrap(), 42);
//! ```

mod invariants;
mod ops;
mod queue;
mod slot;

pub use ops::{BitwiseOps, ValueOps};
pub use queue::{CreateError, PopError, PushError, SlotQueue};
