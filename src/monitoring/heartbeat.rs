/*!
 * Heartbeat Monitor
 *
 * A monotonically advancing 64-bit counter. Combiners feed it their per-session
 * change counts as the reward signal; it also works as a standalone counting
 * structure with the same add/remove/contain vocabulary as the queue and skip
 * list.
 *
 * ## Modes
 *
 * - **Concurrent**: `heartbeat` is an atomic fetch-add
 * - **Single writer**: `heartbeat` is a plain load/store pair, valid only when
 *   one thread writes
 */

use crate::combining::ConcurrentCollection;
use crate::core::limits::{HEARTBEAT_BACKOFF_MAX, HEARTBEAT_BACKOFF_START};
use crate::core::sync::delay;
use crate::core::types::ThreadId;
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for the per-session reward signal
pub trait Monitor: Send + Sync {
    /// Credit `amount` units of work to `thread_id`
    fn add_reward(&self, thread_id: ThreadId, amount: u64);

    /// Total reward so far
    fn reward(&self) -> u64;

    /// Wait (bounded) for the reward to move away from `last`
    fn wait_reward(&self, last: u64) -> u64;
}

/// Heartbeat counter
pub struct Heartbeat {
    concurrent: bool,
    total: CachePadded<AtomicU64>,
}

impl Heartbeat {
    /// Create a heartbeat; `concurrent` selects atomic increments
    pub fn new(concurrent: bool) -> Self {
        Self {
            concurrent,
            total: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Whether increments are atomic read-modify-writes
    #[inline]
    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    /// Advance the counter by `beats` (negative values move it back)
    #[inline]
    pub fn heartbeat(&self, beats: i64) {
        let delta = beats as u64;
        if self.concurrent {
            self.total.fetch_add(delta, Ordering::AcqRel);
        } else {
            let current = self.total.load(Ordering::Relaxed);
            self.total.store(current.wrapping_add(delta), Ordering::Release);
        }
    }

    /// Current count
    #[inline]
    pub fn read(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Wait for the count to differ from `last`, with bounded backoff
    ///
    /// Returns immediately when the count already differs. Otherwise backs off
    /// 100ns, 200ns, ... up to 1600ns, re-reading after each delay, and
    /// returns the current count once the backoff is exhausted whether or not
    /// it changed.
    pub fn wait_for_change(&self, last: u64) -> u64 {
        let current = self.read();
        if current != last {
            return current;
        }

        let mut backoff = HEARTBEAT_BACKOFF_START;
        loop {
            delay(backoff);
            backoff *= 2;
            if backoff > HEARTBEAT_BACKOFF_MAX {
                return self.read();
            }

            let current = self.read();
            if current != last {
                return current;
            }
        }
    }

    /// Spin until the count differs from `last` (unbounded)
    pub fn spin_for_change(&self, last: u64) -> u64 {
        loop {
            let current = self.read();
            if current != last {
                return current;
            }
            std::hint::spin_loop();
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Monitor for Heartbeat {
    #[inline]
    fn add_reward(&self, _thread_id: ThreadId, amount: u64) {
        self.heartbeat(amount as i64);
    }

    #[inline]
    fn reward(&self) -> u64 {
        self.read()
    }

    #[inline]
    fn wait_reward(&self, last: u64) -> u64 {
        self.wait_for_change(last)
    }
}

impl ConcurrentCollection for Heartbeat {
    type Item = u64;

    /// One beat per add; the item is ignored
    fn add(&self, _thread_id: ThreadId, _item: u64) -> bool {
        self.heartbeat(1);
        true
    }

    /// Take one beat back and return the new count
    fn remove(&self, _thread_id: ThreadId) -> Option<u64> {
        self.heartbeat(-1);
        Some(self.read())
    }

    /// Wait for the count to move past `watermark`; `None` if it did not
    /// within the backoff budget
    fn contain(&self, _thread_id: ThreadId, watermark: &u64) -> Option<u64> {
        let seen = self.wait_for_change(*watermark);
        (seen != *watermark).then_some(seen)
    }

    fn size(&self) -> usize {
        self.read() as usize
    }

    fn name(&self) -> &'static str {
        "heartbeat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_single_writer_mode() {
        let hb = Heartbeat::new(false);
        hb.heartbeat(3);
        hb.heartbeat(-1);
        assert_eq!(hb.read(), 2);
        assert!(!hb.is_concurrent());
    }

    #[test]
    fn test_wait_returns_immediately_when_changed() {
        let hb = Heartbeat::default();
        hb.heartbeat(5);
        assert_eq!(hb.wait_for_change(0), 5);
    }

    #[test]
    fn test_wait_gives_up_after_backoff() {
        let hb = Heartbeat::default();
        let start = Instant::now();
        assert_eq!(hb.wait_for_change(0), 0);
        // 100 + 200 + 400 + 800 + 1600 ns
        assert!(start.elapsed() >= Duration::from_nanos(3100));
    }

    #[test]
    fn test_spin_for_change_sees_writer() {
        let hb = Arc::new(Heartbeat::default());
        let writer = {
            let hb = hb.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                hb.heartbeat(1);
            })
        };
        assert_eq!(hb.spin_for_change(0), 1);
        writer.join().unwrap();
    }

    #[test]
    fn test_collection_vocabulary() {
        let hb = Heartbeat::default();
        assert!(hb.add(0, 0));
        assert!(hb.add(1, 0));
        assert_eq!(hb.remove(0), Some(1));
        assert_eq!(hb.size(), 1);
        assert_eq!(hb.contain(0, &0), Some(1));
        assert_eq!(hb.contain(0, &1), None);
        assert_eq!(hb.name(), "heartbeat");
    }

    #[test]
    fn test_monitor_reward() {
        let hb = Heartbeat::default();
        hb.add_reward(3, 10);
        assert_eq!(hb.reward(), 10);
        assert_eq!(hb.wait_reward(0), 10);
    }
}
