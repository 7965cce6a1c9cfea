//! Host-owned callback queue.
//!
//! Modules from garbage-collected languages suspend by asking the host to
//! call them back later. Each request becomes a [`ScheduledCallback`] here;
//! the runner drains the queue until it is empty or the module exits.

use std::cmp::Ordering;

/// Longest delay a callback can be scheduled with, in milliseconds.
///
/// Matches the largest delay browsers honour for `setTimeout`.
pub const MAX_DELAY_MS: f64 = 2_147_483_647.0;

/// A callback the module asked to receive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledCallback {
    /// Identifier handed back to the module when the callback fires.
    pub id: i32,
    /// Clock reading (milliseconds) at which the callback becomes due.
    pub deadline_ms: f64,
}

impl ScheduledCallback {
    fn fires_before(&self, other: &Self) -> Ordering {
        self.deadline_ms
            .total_cmp(&other.deadline_ms)
            .then(self.id.cmp(&other.id))
    }
}

/// Pending callbacks ordered by deadline, then by scheduling order.
#[derive(Debug)]
pub struct CallbackQueue {
    pending: Vec<ScheduledCallback>,
    next_id: i32,
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackQueue {
    /// Create an empty queue. The first id handed out is `1`.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            next_id: 1,
        }
    }

    /// Schedule a callback `delay_ms` after `now_ms`.
    ///
    /// Negative and NaN delays count as zero; delays past [`MAX_DELAY_MS`]
    /// (including infinity) are clamped to it.
    pub fn schedule(&mut self, now_ms: f64, delay_ms: f64) -> i32 {
        let delay_ms = if delay_ms.is_nan() {
            0.0
        } else {
            delay_ms.clamp(0.0, MAX_DELAY_MS)
        };
        let id = self.allocate_id();

        self.pending.push(ScheduledCallback {
            id,
            deadline_ms: now_ms + delay_ms,
        });
        id
    }

    /// Next free id. Ids stay positive; wrapping past `i32::MAX` restarts at
    /// 1 and skips ids that are still pending.
    fn allocate_id(&mut self) -> i32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);

            if !self.pending.iter().any(|cb| cb.id == id) {
                return id;
            }
        }
    }

    /// Remove a pending callback. Returns `false` if it already fired or
    /// never existed.
    pub fn cancel(&mut self, id: i32) -> bool {
        let Some(index) = self.pending.iter().position(|cb| cb.id == id) else {
            return false;
        };
        self.pending.swap_remove(index);
        true
    }

    /// Remove and return the callback that fires next.
    pub fn pop_next(&mut self) -> Option<ScheduledCallback> {
        let index = self
            .pending
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.fires_before(b))
            .map(|(index, _)| index)?;
        Some(self.pending.swap_remove(index))
    }

    /// Number of pending callbacks.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let mut queue = CallbackQueue::new();
        assert_eq!(queue.schedule(0.0, 10.0), 1);
        assert_eq!(queue.schedule(0.0, 10.0), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_earliest_deadline_first() {
        let mut queue = CallbackQueue::new();
        let late = queue.schedule(0.0, 50.0);
        let early = queue.schedule(0.0, 5.0);
        let middle = queue.schedule(10.0, 10.0);

        assert_eq!(queue.pop_next().map(|cb| cb.id), Some(early));
        assert_eq!(queue.pop_next().map(|cb| cb.id), Some(middle));
        assert_eq!(queue.pop_next().map(|cb| cb.id), Some(late));
        assert!(queue.pop_next().is_none());
    }

    #[test]
    fn test_ties_fire_in_scheduling_order() {
        let mut queue = CallbackQueue::new();
        let ids: Vec<i32> = (0..5).map(|_| queue.schedule(1.0, 0.0)).collect();

        let fired: Vec<i32> = std::iter::from_fn(|| queue.pop_next().map(|cb| cb.id)).collect();
        assert_eq!(fired, ids);
    }

    #[test]
    fn test_negative_and_nan_delay() {
        let mut queue = CallbackQueue::new();
        queue.schedule(100.0, -20.0);
        queue.schedule(100.0, f64::NAN);

        while let Some(cb) = queue.pop_next() {
            assert!((cb.deadline_ms - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_cancel() {
        let mut queue = CallbackQueue::new();
        let a = queue.schedule(0.0, 1.0);
        let b = queue.schedule(0.0, 2.0);

        assert!(queue.cancel(a));
        assert!(!queue.cancel(a));
        assert!(!queue.cancel(999));

        assert_eq!(queue.pop_next().map(|cb| cb.id), Some(b));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_id_wraps_to_one() {
        let mut queue = CallbackQueue::new();
        queue.next_id = i32::MAX;

        assert_eq!(queue.schedule(0.0, 0.0), i32::MAX);
        assert_eq!(queue.schedule(0.0, 0.0), 1);
    }

    #[test]
    fn test_wrapped_id_skips_pending() {
        let mut queue = CallbackQueue::new();
        let first = queue.schedule(0.0, 100.0);
        queue.next_id = i32::MAX;

        assert_eq!(queue.schedule(0.0, 0.0), i32::MAX);
        // 1 is still pending, so the next id is 2
        assert_eq!(queue.schedule(0.0, 0.0), 2);

        assert!(queue.cancel(first));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_huge_and_infinite_delay_clamped() {
        let mut queue = CallbackQueue::new();
        queue.schedule(10.0, f64::INFINITY);
        queue.schedule(10.0, 1e300);

        while let Some(cb) = queue.pop_next() {
            assert!(cb.deadline_ms.is_finite());
            assert!((cb.deadline_ms - (10.0 + MAX_DELAY_MS)).abs() < f64::EPSILON);
        }
    }
}
