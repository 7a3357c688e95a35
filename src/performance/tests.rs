#[cfg(test)]
mod tests {
    use crate::performance::PerformanceTracker;
    use std::time::Duration;

    #[test]
    fn test_nearest_rank_percentiles() {
        let mut tracker = PerformanceTracker::new(100);
        // inserted out of order on purpose
        for ms in [100.0, 30.0, 10.0, 90.0, 50.0, 20.0, 80.0, 40.0, 70.0, 60.0] {
            tracker.track_millis("GET /api/attendance", ms);
        }

        let stats = tracker.stats("GET /api/attendance").unwrap();
        assert_eq!(stats.count, 10);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 100.0);
        assert_eq!(stats.average, 55.0);
        assert_eq!(stats.p50, 60.0);
        assert_eq!(stats.p95, 100.0);
        assert_eq!(stats.p99, 100.0);
    }

    #[test]
    fn test_single_sample() {
        let mut tracker = PerformanceTracker::new(100);
        tracker.track_request("POST /api/attendance/check-in", Duration::from_millis(42));

        let stats = tracker.stats("POST /api/attendance/check-in").unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.p50, 42.0);
        assert_eq!(stats.p99, 42.0);
    }

    #[test]
    fn test_oldest_samples_are_dropped() {
        let mut tracker = PerformanceTracker::new(3);
        for ms in [1000.0, 1.0, 2.0, 3.0] {
            tracker.track_millis("GET /x", ms);
        }

        let stats = tracker.stats("GET /x").unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.max, 3.0);
    }

    #[test]
    fn test_unknown_endpoint_has_no_stats() {
        let tracker = PerformanceTracker::new(100);
        assert!(tracker.stats("GET /nowhere").is_none());
        assert!(tracker.all_stats().is_empty());
    }

    #[test]
    fn test_all_stats_and_clear() {
        let mut tracker = PerformanceTracker::new(100);
        tracker.track_millis("GET /a", 5.0);
        tracker.track_millis("GET /b", 7.0);

        let all = tracker.all_stats();
        assert_eq!(all.len(), 2);
        assert_eq!(all["GET /b"].max, 7.0);

        tracker.clear();
        assert!(tracker.all_stats().is_empty());
    }
}
