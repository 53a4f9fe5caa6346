//! Minimal usage: a hook-less queue of integers, then a queue of
//! reference-counted payloads with lifecycle hooks.

use slotq::{SlotQueue, ValueOps};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

struct TrackingOps {
    alive: Arc<AtomicI64>,
}

impl ValueOps<Arc<String>> for TrackingOps {
    type PushContext = ();
    type PopContext = ();

    fn copy_in(&self, _context: &(), src: &Arc<String>) -> Arc<String> {
        self.alive.fetch_add(1, Ordering::SeqCst);
        Arc::clone(src)
    }

    fn move_out(&self, _context: &(), value: Arc<String>) -> Arc<String> {
        self.alive.fetch_sub(1, Ordering::SeqCst);
        value
    }

    fn dispose(&self, value: Arc<String>) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
        drop(value);
    }
}

fn main() {
    // Plain Copy elements need no hooks.
    let numbers = SlotQueue::<u64>::new(8).unwrap();
    numbers.push(&1, &()).unwrap();
    numbers.push(&2, &()).unwrap();

    // A predicate can decline the head value without consuming it.
    assert!(numbers.pop_if(&(), |v| *v > 1).is_err());
    assert_eq!(numbers.pop(&()).unwrap(), 1);
    assert_eq!(numbers.pop(&()).unwrap(), 2);

    // Reference-counted payloads go through lifecycle hooks.
    let alive = Arc::new(AtomicI64::new(0));
    let tracked = SlotQueue::with_ops(
        8,
        TrackingOps {
            alive: Arc::clone(&alive),
        },
    )
    .unwrap();

    let payload = Arc::new(String::from("hello"));
    tracked.push(&payload, &()).unwrap();
    tracked.push(&payload, &()).unwrap();

    let out = tracked.pop(&()).unwrap();
    println!("popped: {out}");

    // The value never popped is drained through dispose on the last drop.
    drop(tracked);
    assert_eq!(alive.load(Ordering::SeqCst), 0);
}
