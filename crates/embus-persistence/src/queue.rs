// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bucketed queue of pending field values.
//!
//! Concurrent multi-map keyed by quantized timestamp. Producers insert
//! under the mutex; the flush cycle drains or clears the whole map
//! atomically through the same mutex, so a drain never observes a
//! partial bucket.

use embus_influx::FieldValue;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Quantize a millisecond timestamp to the configured interval width.
///
/// Integer division: all timestamps within one interval share a key.
/// A zero width would divide by zero and is treated as no quantization.
pub fn bucket_key(now_ms: u64, interval_ms: u64) -> u64 {
    if interval_ms == 0 {
        return now_ms;
    }
    now_ms / interval_ms * interval_ms
}

/// Multi-map from bucket key to the field values observed in that window.
///
/// Repeated updates to the same field within a window are all retained;
/// within-bucket order is insertion order. Growth between flushes is
/// unbounded; `clear` is the safety valve the flush cycle uses while no
/// sink connection exists.
#[derive(Default)]
pub struct BucketQueue {
    inner: Mutex<HashMap<u64, Vec<FieldValue>>>,
}

impl BucketQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under a bucket key. O(1), in-memory only.
    pub fn put(&self, key: u64, value: FieldValue) {
        self.inner.lock().entry(key).or_default().push(value);
    }

    /// Atomically take the full mapping, leaving the queue empty.
    pub fn drain_all(&self) -> HashMap<u64, Vec<FieldValue>> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Atomically discard all contents.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of pending field values across all buckets.
    pub fn len(&self) -> usize {
        self.inner.lock().values().map(Vec::len).sum()
    }

    /// True when no values are pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embus_influx::Value;
    use std::sync::Arc;

    fn fv(field: &str, v: i64) -> FieldValue {
        FieldValue::new(field, Value::Integer(v))
    }

    #[test]
    fn test_bucket_key_quantizes_down() {
        assert_eq!(bucket_key(1_000, 10_000), 0);
        assert_eq!(bucket_key(9_500, 10_000), 0);
        assert_eq!(bucket_key(10_000, 10_000), 10_000);
        assert_eq!(bucket_key(25_000, 10_000), 20_000);
        assert_eq!(bucket_key(25_000, 7_000), 21_000);
    }

    #[test]
    fn test_bucket_key_zero_interval() {
        assert_eq!(bucket_key(12_345, 0), 12_345);
    }

    #[test]
    fn test_put_same_window_shares_bucket() {
        let queue = BucketQueue::new();
        queue.put(bucket_key(1_000, 10_000), fv("power", 42));
        queue.put(bucket_key(9_500, 10_000), fv("power", 43));

        let buckets = queue.drain_all();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&0], vec![fv("power", 42), fv("power", 43)]);
    }

    #[test]
    fn test_drain_all_is_idempotent() {
        let queue = BucketQueue::new();
        queue.put(0, fv("a", 1));

        let first = queue.drain_all();
        assert_eq!(first.len(), 1);

        let second = queue.drain_all();
        assert!(second.is_empty());
    }

    #[test]
    fn test_clear_discards_everything() {
        let queue = BucketQueue::new();
        queue.put(0, fv("a", 1));
        queue.put(10_000, fv("b", 2));
        assert_eq!(queue.len(), 2);

        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_len_counts_values_across_buckets() {
        let queue = BucketQueue::new();
        queue.put(0, fv("a", 1));
        queue.put(0, fv("a", 2));
        queue.put(10_000, fv("b", 3));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue = Arc::new(BucketQueue::new());
        let mut handles = Vec::new();

        for t in 0..8u64 {
            let queue = Arc::clone(&queue);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    queue.put(t * 10_000, fv("ch", i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(queue.len(), 800);
        let buckets = queue.drain_all();
        assert_eq!(buckets.len(), 8);
        assert!(buckets.values().all(|v| v.len() == 100));
    }
}
