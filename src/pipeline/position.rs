use parking_lot::Mutex;
use tracing::trace;

use crate::binlog::StreamPosition;

/// Furthest stream position observed during a run.
///
/// The tracked value never moves backwards, whatever order positions are
/// reported in.
#[derive(Debug, Default)]
pub struct PositionTracker {
    current: Mutex<StreamPosition>,
}

impl PositionTracker {
    pub fn new(initial: StreamPosition) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    /// Raises the tracked position to `observed` if it is further along.
    /// Returns whether the position advanced.
    pub fn merge(&self, observed: &StreamPosition) -> bool {
        let mut current = self.current.lock();
        if *observed > *current {
            trace!("Position advanced {} -> {}", current, observed);
            *current = observed.clone();
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> StreamPosition {
        self.current.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn positions() -> Vec<StreamPosition> {
        vec![
            StreamPosition::new("mysql-bin.000002", 120),
            StreamPosition::new("mysql-bin.000001", 99_999),
            StreamPosition::new("mysql-bin.000003", 4),
            StreamPosition::new("mysql-bin.000002", 88_000),
            StreamPosition::new("mysql-bin.000003", 3),
        ]
    }

    #[test]
    fn test_never_regresses() {
        let tracker = PositionTracker::new(StreamPosition::new("mysql-bin.000002", 4));

        assert!(tracker.merge(&StreamPosition::new("mysql-bin.000002", 500)));
        assert!(!tracker.merge(&StreamPosition::new("mysql-bin.000002", 400)));
        assert!(!tracker.merge(&StreamPosition::new("mysql-bin.000001", 90_000)));
        assert_eq!(tracker.snapshot(), StreamPosition::new("mysql-bin.000002", 500));
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let expected = StreamPosition::new("mysql-bin.000003", 4);
        let mut all = positions();

        for rotation in 0..all.len() {
            all.rotate_left(1);
            let tracker = PositionTracker::default();
            for p in &all {
                tracker.merge(p);
            }
            assert_eq!(tracker.snapshot(), expected, "rotation {}", rotation);

            let tracker = PositionTracker::default();
            for p in all.iter().rev() {
                tracker.merge(p);
            }
            assert_eq!(tracker.snapshot(), expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_merges() {
        let tracker = Arc::new(PositionTracker::default());
        let handles: Vec<_> = (0..16u64)
            .map(|i| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    for offset in (0..100u64).rev() {
                        tracker.merge(&StreamPosition::new(format!("mysql-bin.{:06}", i % 4), offset * 10 + i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tracker.snapshot(), StreamPosition::new("mysql-bin.000003", 99 * 10 + 15));
    }
}
