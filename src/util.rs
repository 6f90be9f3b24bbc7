//! Small reusable pieces: fixed windows, cooldowns, fps.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Fixed-capacity FIFO window. Pushing onto a full buffer evicts the
/// oldest sample. Used for both the wrist-position history and the
/// label-stability window.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    cap: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "ring buffer capacity must be positive");
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.cap
    }

    pub fn front(&self) -> Option<&T> {
        self.buf.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    #[allow(dead_code)]
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Per-key rate limiter. A key is ready when no deadline is stored for it
/// or the stored deadline has passed; triggering stores `now + interval`.
/// Advisory only: callers skip the action when not ready, nothing queues.
#[derive(Debug)]
pub struct CooldownManager<K> {
    default_interval: Duration,
    next_ready: HashMap<K, Instant>,
}

impl<K: Eq + Hash> CooldownManager<K> {
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            next_ready: HashMap::new(),
        }
    }

    pub fn ready(&self, key: &K, now: Instant) -> bool {
        match self.next_ready.get(key) {
            Some(deadline) => now >= *deadline,
            None => true,
        }
    }

    pub fn trigger(&mut self, key: K, now: Instant, interval: Option<Duration>) {
        let interval = interval.unwrap_or(self.default_interval);
        self.next_ready.insert(key, now + interval);
    }
}

/// Exponentially smoothed frames-per-second meter.
#[derive(Debug)]
pub struct FpsMeter {
    prev: Option<Instant>,
    smoothing: f32,
    fps: f32,
}

impl FpsMeter {
    pub fn new(smoothing: f32) -> Self {
        Self {
            prev: None,
            smoothing: smoothing.clamp(0.0, 1.0),
            fps: 0.0,
        }
    }

    pub fn tick(&mut self, now: Instant) -> f32 {
        let Some(prev) = self.prev.replace(now) else {
            return 0.0;
        };
        let dt = now.saturating_duration_since(prev).as_secs_f32();
        if dt > 0.0 {
            let inst = 1.0 / dt;
            self.fps = if self.fps > 0.0 {
                self.smoothing * self.fps + (1.0 - self.smoothing) * inst
            } else {
                inst
            };
        }
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut rb = RingBuffer::new(3);
        for i in 0..5 {
            rb.push(i);
        }
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.front(), Some(&2));
        assert_eq!(rb.back(), Some(&4));
        assert_eq!(rb.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn ring_buffer_fill_state() {
        let mut rb = RingBuffer::new(2);
        assert!(!rb.is_full());
        rb.push(1);
        assert!(!rb.is_full());
        rb.push(2);
        assert!(rb.is_full());
    }

    #[test]
    fn cooldown_absent_key_is_ready() {
        let cd: CooldownManager<&str> = CooldownManager::new(Duration::from_millis(500));
        assert!(cd.ready(&"system.fist", Instant::now()));
    }

    #[test]
    fn cooldown_blocks_until_deadline() {
        let mut cd = CooldownManager::new(Duration::from_millis(500));
        let t0 = Instant::now();
        cd.trigger("k", t0, None);
        assert!(!cd.ready(&"k", t0));
        assert!(!cd.ready(&"k", t0 + Duration::from_millis(499)));
        assert!(cd.ready(&"k", t0 + Duration::from_millis(500)));
    }

    #[test]
    fn cooldown_keys_are_independent() {
        let mut cd = CooldownManager::new(Duration::from_secs(1));
        let t0 = Instant::now();
        cd.trigger(("system", "fist"), t0, None);
        assert!(!cd.ready(&("system", "fist"), t0));
        assert!(cd.ready(&("media", "fist"), t0));
    }

    #[test]
    fn cooldown_explicit_interval_overrides_default() {
        let mut cd = CooldownManager::new(Duration::from_secs(10));
        let t0 = Instant::now();
        cd.trigger("k", t0, Some(Duration::from_millis(100)));
        assert!(cd.ready(&"k", t0 + Duration::from_millis(100)));
    }

    #[test]
    fn fps_meter_smooths() {
        let mut m = FpsMeter::new(0.9);
        let t0 = Instant::now();
        assert_eq!(m.tick(t0), 0.0);
        let fps = m.tick(t0 + Duration::from_millis(100));
        assert!((fps - 10.0).abs() < 0.1);
    }
}
