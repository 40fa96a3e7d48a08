/*!
 * Heartbeat Integration Tests
 */

use adaptive_fc::{ConcurrentCollection, Heartbeat, Monitor};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_heartbeats_are_counted() {
    const THREADS: u64 = 8;
    const CALLS: u64 = 10_000;

    let hb = Arc::new(Heartbeat::new(true));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let hb = hb.clone();
            thread::spawn(move || {
                for _ in 0..CALLS {
                    hb.heartbeat(1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(hb.read(), THREADS * CALLS);
}

#[test]
fn test_wait_from_stale_snapshot() {
    let hb = Arc::new(Heartbeat::default());
    let stale = hb.read();

    let writer = {
        let hb = hb.clone();
        thread::spawn(move || hb.heartbeat(3))
    };
    writer.join().unwrap();

    assert_eq!(hb.wait_for_change(stale), 3);
    // Unchanged counter: the wait gives up and hands back the current value
    assert_eq!(hb.wait_for_change(3), 3);
}

#[test]
fn test_contain_waits_for_watermark() {
    let hb = Arc::new(Heartbeat::default());
    assert_eq!(hb.contain(0, &0), None);

    let ticker = {
        let hb = hb.clone();
        thread::spawn(move || {
            for _ in 0..5 {
                hb.add(1, 0);
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let seen = hb.spin_for_change(0);
    assert!(seen >= 1);
    ticker.join().unwrap();
    assert_eq!(hb.contain(0, &0), Some(5));
    assert_eq!(hb.size(), 5);
}

#[test]
fn test_remove_decrements() {
    let hb = Heartbeat::new(false);
    for _ in 0..4 {
        hb.add(0, 0);
    }
    assert_eq!(hb.remove(0), Some(3));
    assert_eq!(hb.remove(0), Some(2));
    assert!(!hb.is_empty());
}

#[test]
fn test_monitor_as_trait_object() {
    let hb = Arc::new(Heartbeat::default());
    let monitor: Arc<dyn Monitor> = hb.clone();
    monitor.add_reward(0, 40);
    monitor.add_reward(5, 2);
    assert_eq!(monitor.reward(), 42);
    assert_eq!(hb.read(), 42);
    assert_eq!(monitor.wait_reward(0), 42);
}
