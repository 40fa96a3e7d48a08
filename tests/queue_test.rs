/*!
 * Flat-Combining Queue Integration Tests
 *
 * FIFO behavior against a sequential model, multi-threaded stress under both
 * lock disciplines and both tuning regimes, and the advisory liveness signals
 */

use adaptive_fc::{
    AdaptiveTuner, CombiningContext, ConcurrentCollection, FcConfig, FixedPolicy, Heartbeat,
    LockDiscipline, SmartQueue,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

fn stress(config: FcConfig, producers: usize, consumers: usize, per_producer: usize) {
    let queue = Arc::new(SmartQueue::<usize>::new(config, &CombiningContext::default()).unwrap());
    let total = producers * per_producer;
    let consumed = Arc::new(AtomicUsize::new(0));

    let producer_handles: Vec<_> = (0..producers)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..per_producer {
                    queue.enqueue(p, p * per_producer + i);
                }
            })
        })
        .collect();

    let consumer_handles: Vec<_> = (0..consumers)
        .map(|c| {
            let queue = queue.clone();
            let consumed = consumed.clone();
            thread::spawn(move || {
                let tid = producers + c;
                let mut seen = Vec::new();
                while consumed.load(Ordering::SeqCst) < total {
                    if let Some(value) = queue.dequeue(tid) {
                        consumed.fetch_add(1, Ordering::SeqCst);
                        seen.push(value);
                    }
                }
                seen
            })
        })
        .collect();

    for handle in producer_handles {
        handle.join().unwrap();
    }

    let mut all = HashSet::new();
    for handle in consumer_handles {
        let seen = handle.join().unwrap();

        // Each producer's values reach any one consumer in production order
        for p in 0..producers {
            let from_p: Vec<usize> = seen
                .iter()
                .copied()
                .filter(|v| v / per_producer == p)
                .collect();
            assert!(
                from_p.windows(2).all(|w| w[0] < w[1]),
                "producer {p} reordered: {from_p:?}"
            );
        }

        for value in seen {
            assert!(all.insert(value), "value {value} dequeued twice");
        }
    }

    assert_eq!(all.len(), total);
    assert!(queue.is_empty());
    assert_eq!(queue.dequeue(0), None);
}

#[test]
fn test_stress_abort_semaphore_exploring() {
    let config = FcConfig::default()
        .with_threads(8)
        .with_discipline(LockDiscipline::AbortSemaphore)
        .with_explore_interval(1);
    stress(config, 4, 4, 2000);
}

#[test]
fn test_stress_abort_semaphore_exploiting() {
    let config = FcConfig::default()
        .with_threads(8)
        .with_discipline(LockDiscipline::AbortSemaphore);
    stress(config, 4, 4, 2000);
}

#[test]
fn test_stress_spin_exploring() {
    let config = FcConfig::spinning()
        .with_threads(8)
        .with_explore_interval(1);
    stress(config, 4, 4, 2000);
}

#[test]
fn test_stress_spin_exploiting() {
    let config = FcConfig::spinning().with_threads(8);
    stress(config, 4, 4, 2000);
}

#[test]
fn test_stress_fixed_passes() {
    let config = FcConfig::fixed(3).with_threads(6);
    stress(config, 3, 3, 1000);
}

#[test]
fn test_every_request_answered() {
    const THREADS: usize = 8;
    const REQUESTS: usize = 1000;

    for discipline in [LockDiscipline::Spin, LockDiscipline::AbortSemaphore] {
        let config = FcConfig::default()
            .with_threads(THREADS)
            .with_discipline(discipline);
        let queue = Arc::new(SmartQueue::new(config, &CombiningContext::default()).unwrap());
        let answers = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|tid| {
                let queue = queue.clone();
                let answers = answers.clone();
                thread::spawn(move || {
                    for i in 0..REQUESTS {
                        if i % 2 == 0 {
                            queue.enqueue(tid, i as u64);
                        } else {
                            let _ = queue.dequeue(tid);
                        }
                        answers.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(answers.load(Ordering::Relaxed), THREADS * REQUESTS);
        assert!(queue.sessions() > 0);
        assert!(queue.sessions() <= (THREADS * REQUESTS) as u64);
    }
}

#[test]
fn test_boxed_elements_move_through() {
    let queue = SmartQueue::<Box<String>>::with_threads(2).unwrap();
    queue.enqueue(0, Box::new("alpha".to_string()));
    queue.enqueue(1, Box::new("beta".to_string()));
    assert_eq!(queue.dequeue(1).as_deref().map(String::as_str), Some("alpha"));
    assert_eq!(queue.dequeue(0).as_deref().map(String::as_str), Some("beta"));
}

#[test]
fn test_dead_and_empty_signals() {
    let queue = SmartQueue::<u32>::with_threads(3).unwrap();
    assert!(queue.is_empty());

    queue.enqueue(2, 9);
    assert!(!queue.is_empty());
    assert_eq!(queue.size(), 1);

    assert_eq!(queue.dequeue(0), Some(9));
    assert!(queue.is_empty());
    assert!(!queue.is_dead());

    for tid in 0..3 {
        assert_eq!(queue.dequeue(tid), None);
    }
    assert!(queue.is_dead());
}

#[test]
fn test_batch_capacity_starts_at_four() {
    let queue = SmartQueue::<u32>::with_threads(1).unwrap();
    assert_eq!(queue.batch_capacity(), 4);
    for i in 0..10 {
        queue.enqueue(0, i);
    }
    // One element per session never fills a batch
    assert_eq!(queue.batch_capacity(), 4);
    assert_eq!(queue.snapshot(), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_sessions_reward_monitor() {
    let heartbeat = Arc::new(Heartbeat::default());
    let ctx = CombiningContext::new(
        Arc::new(AdaptiveTuner::new(Box::new(FixedPolicy(0)))),
        heartbeat.clone(),
    );
    let queue = SmartQueue::new(FcConfig::default().with_threads(1), &ctx).unwrap();

    queue.enqueue(0, 1u8);
    queue.enqueue(0, 2u8);
    assert_eq!(queue.dequeue(0), Some(1));
    assert_eq!(queue.dequeue(0), Some(2));
    assert_eq!(queue.dequeue(0), None);

    // One change per serviced request, empty answers included
    assert_eq!(heartbeat.read(), 5);
    assert_eq!(queue.sessions(), 5);
}

#[test]
fn test_structures_share_one_tuner() {
    let tuner = Arc::new(AdaptiveTuner::default());
    let ctx = CombiningContext::without_monitor(tuner.clone());
    let a = SmartQueue::<u8>::new(FcConfig::default(), &ctx).unwrap();
    let b = SmartQueue::<u8>::new(FcConfig::default(), &ctx).unwrap();
    let _fixed = SmartQueue::<u8>::new(FcConfig::fixed(1), &ctx).unwrap();

    assert_eq!(tuner.registered(), 2);
    a.enqueue(0, 1);
    b.enqueue(0, 1);
    assert_eq!(tuner.feedback_count(), 2);
}

#[derive(Debug, Clone)]
enum Op {
    Enqueue(u16),
    Dequeue,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![any::<u16>().prop_map(Op::Enqueue), Just(Op::Dequeue)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_matches_sequential_fifo(ops in prop::collection::vec(op_strategy(), 0..200)) {
        let queue = SmartQueue::<u16>::with_threads(1).unwrap();
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                Op::Enqueue(value) => {
                    queue.enqueue(0, value);
                    model.push_back(value);
                }
                Op::Dequeue => {
                    prop_assert_eq!(queue.dequeue(0), model.pop_front());
                }
            }
            prop_assert_eq!(queue.size(), model.len());
        }
        prop_assert_eq!(queue.snapshot(), model.into_iter().collect::<Vec<_>>());
    }
}
