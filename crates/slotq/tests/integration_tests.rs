//! Multi-threaded integration tests.
//!
//! The chaos tests run a fixed wall-clock interval with many threads doing
//! random operations, checking forward progress per time slice and
//! accounting invariants at quiescence.

use rand::Rng;
use slotq::{PopError, PushError, SlotQueue, ValueOps};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn spsc_stream_preserves_order() {
    const N: u64 = 10_000;

    let queue = SlotQueue::<u64>::new(16).unwrap();

    let pusher = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 1..=N {
                loop {
                    match queue.push(&i, &()) {
                        Ok(()) => break,
                        Err(PushError::QueueFull) => std::hint::spin_loop(),
                    }
                }
            }
        })
    };

    let popper = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut expected = 1u64;
            while expected <= N {
                match queue.pop(&()) {
                    Ok(value) => {
                        assert_eq!(
                            value, expected,
                            "order violation: expected {}, got {}",
                            expected, value
                        );
                        expected += 1;
                    }
                    Err(PopError::QueueEmpty) => std::hint::spin_loop(),
                    Err(PopError::Rejected) => {
                        unreachable!("pop without a predicate cannot be rejected")
                    }
                }
            }
        })
    };

    pusher.join().unwrap();
    popper.join().unwrap();

    assert!(queue.is_empty());
}

const CHAOS_THREADS: usize = 16;
const CHAOS_SLICE: Duration = Duration::from_millis(500);
const CHAOS_SLICES: usize = 2;

#[test]
fn chaos_many_threads_random_push_pop() {
    let queue = SlotQueue::<i64>::new(16).unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let next_value = Arc::new(AtomicI64::new(1));
    let pushed = Arc::new(AtomicU64::new(0));
    let popped = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::with_capacity(CHAOS_THREADS);
    for _ in 0..CHAOS_THREADS {
        let queue = queue.clone();
        let stop = Arc::clone(&stop);
        let next_value = Arc::clone(&next_value);
        let pushed = Arc::clone(&pushed);
        let popped = Arc::clone(&popped);

        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            while !stop.load(Ordering::Relaxed) {
                if rng.gen::<bool>() {
                    let value = next_value.fetch_add(1, Ordering::SeqCst);
                    match queue.push(&value, &()) {
                        Ok(()) => {
                            pushed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(PushError::QueueFull) => {}
                    }
                } else {
                    match queue.pop(&()) {
                        Ok(_) => {
                            popped.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(PopError::QueueEmpty) => {}
                        Err(PopError::Rejected) => {
                            unreachable!("pop without a predicate cannot be rejected")
                        }
                    }
                }
            }
        }));
    }

    // Every slice must show forward progress on both sides.
    for _ in 0..CHAOS_SLICES {
        let pushed_before = pushed.load(Ordering::SeqCst);
        let popped_before = popped.load(Ordering::SeqCst);

        thread::sleep(CHAOS_SLICE);

        assert!(pushed.load(Ordering::SeqCst) > pushed_before);
        assert!(popped.load(Ordering::SeqCst) > popped_before);
    }

    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().unwrap();
    }

    // Conservation at quiescence: what went in and never came out is still
    // resident.
    let resident = pushed.load(Ordering::SeqCst) - popped.load(Ordering::SeqCst);
    assert_eq!(queue.len() as u64, resident);
    assert!(resident <= 16);
}

/// Hooks tracking how many values the queue currently owns; the counter is
/// shared with the test so it survives the queue.
struct TrackingOps {
    alive: Arc<AtomicI64>,
}

impl ValueOps<Arc<i64>> for TrackingOps {
    type PushContext = ();
    type PopContext = ();

    fn copy_in(&self, _context: &(), src: &Arc<i64>) -> Arc<i64> {
        self.alive.fetch_add(1, Ordering::SeqCst);
        Arc::clone(src)
    }

    fn move_out(&self, _context: &(), value: Arc<i64>) -> Arc<i64> {
        self.alive.fetch_sub(1, Ordering::SeqCst);
        value
    }

    fn dispose(&self, value: Arc<i64>) {
        self.alive.fetch_sub(1, Ordering::SeqCst);
        drop(value);
    }
}

#[test]
fn chaos_refcounted_elements_drain_to_zero() {
    let alive = Arc::new(AtomicI64::new(0));
    let queue = SlotQueue::with_ops(
        16,
        TrackingOps {
            alive: Arc::clone(&alive),
        },
    )
    .unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let next_value = Arc::new(AtomicI64::new(1));
    let pushed = Arc::new(AtomicU64::new(0));
    let popped = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::with_capacity(CHAOS_THREADS);
    for _ in 0..CHAOS_THREADS {
        let queue = queue.clone();
        let stop = Arc::clone(&stop);
        let next_value = Arc::clone(&next_value);
        let pushed = Arc::clone(&pushed);
        let popped = Arc::clone(&popped);

        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            while !stop.load(Ordering::Relaxed) {
                match rng.gen_range(0..3) {
                    0 => {
                        let item = Arc::new(next_value.fetch_add(1, Ordering::SeqCst));
                        match queue.push(&item, &()) {
                            Ok(()) => {
                                pushed.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(PushError::QueueFull) => {}
                        }
                    }
                    1 => match queue.pop(&()) {
                        Ok(_) => {
                            popped.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(PopError::QueueEmpty) => {}
                        Err(PopError::Rejected) => {
                            unreachable!("pop without a predicate cannot be rejected")
                        }
                    },
                    _ => {
                        // Randomly-rejecting predicate; a rejected pop must
                        // consume nothing.
                        let keep = rng.gen::<bool>();
                        match queue.pop_if(&(), |_| keep) {
                            Ok(_) => {
                                popped.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(PopError::QueueEmpty | PopError::Rejected) => {}
                        }
                    }
                }
            }
        }));
    }

    for _ in 0..CHAOS_SLICES {
        let pushed_before = pushed.load(Ordering::SeqCst);
        let popped_before = popped.load(Ordering::SeqCst);

        thread::sleep(CHAOS_SLICE);

        assert!(pushed.load(Ordering::SeqCst) > pushed_before);
        assert!(popped.load(Ordering::SeqCst) > popped_before);
    }

    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().unwrap();
    }

    let resident = pushed.load(Ordering::SeqCst) - popped.load(Ordering::SeqCst);
    assert_eq!(alive.load(Ordering::SeqCst), resident as i64);

    // Last drop drains everything still resident through dispose.
    drop(queue);
    assert_eq!(alive.load(Ordering::SeqCst), 0);
}

#[test]
fn mpmc_every_push_is_delivered_exactly_once() {
    const PRODUCERS: u64 = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: u64 = 2_500;
    const TOTAL: u64 = PRODUCERS * PER_PRODUCER;

    let queue = SlotQueue::<u64>::new(16).unwrap();
    let delivered = Arc::new(AtomicU64::new(0));

    let mut producers = Vec::new();
    for producer_id in 0..PRODUCERS {
        let queue = queue.clone();
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                let value = producer_id * PER_PRODUCER + i;
                loop {
                    match queue.push(&value, &()) {
                        Ok(()) => break,
                        Err(PushError::QueueFull) => std::hint::spin_loop(),
                    }
                }
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..CONSUMERS {
        let queue = queue.clone();
        let delivered = Arc::clone(&delivered);
        consumers.push(thread::spawn(move || {
            let mut received = Vec::new();
            while delivered.load(Ordering::SeqCst) < TOTAL {
                match queue.pop(&()) {
                    Ok(value) => {
                        delivered.fetch_add(1, Ordering::SeqCst);
                        received.push(value);
                    }
                    Err(PopError::QueueEmpty) => std::hint::spin_loop(),
                    Err(PopError::Rejected) => {
                        unreachable!("pop without a predicate cannot be rejected")
                    }
                }
            }
            received
        }));
    }

    for producer in producers {
        producer.join().unwrap();
    }

    let mut all_received = Vec::with_capacity(TOTAL as usize);
    for consumer in consumers {
        all_received.extend(consumer.join().unwrap());
    }

    // Exactly-once delivery: the union of all consumers' values is exactly
    // the set of pushed values, no loss, no duplication.
    all_received.sort_unstable();
    assert_eq!(all_received.len() as u64, TOTAL);
    for (i, value) in all_received.iter().enumerate() {
        assert_eq!(*value, i as u64);
    }
    assert!(queue.is_empty());
}

#[test]
fn capacity_one_ping_pong_stays_ordered() {
    // A capacity-1 queue degenerates to a ping-pong: every push waits out a
    // QueueFull, every pop an occasional QueueEmpty, and order must hold.
    let queue = SlotQueue::<u64>::new(1).unwrap();

    let pusher = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..2_000u64 {
                loop {
                    match queue.push(&i, &()) {
                        Ok(()) => break,
                        Err(PushError::QueueFull) => std::hint::spin_loop(),
                    }
                }
            }
        })
    };

    let popper = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut expected = 0u64;
            while expected < 2_000 {
                match queue.pop(&()) {
                    Ok(value) => {
                        assert_eq!(value, expected);
                        expected += 1;
                    }
                    Err(PopError::QueueEmpty) => std::hint::spin_loop(),
                    Err(PopError::Rejected) => {
                        unreachable!("pop without a predicate cannot be rejected")
                    }
                }
            }
        })
    };

    pusher.join().unwrap();
    popper.join().unwrap();
    assert!(queue.is_empty());
}
