//! Rolling latency samples per endpoint with nearest-rank percentiles.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub count: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

pub struct PerformanceTracker {
    max_samples: usize,
    samples: HashMap<String, VecDeque<f64>>,
}

impl PerformanceTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples: max_samples.max(1),
            samples: HashMap::new(),
        }
    }

    pub fn track_request(&mut self, endpoint: &str, elapsed: Duration) {
        self.track_millis(endpoint, elapsed.as_secs_f64() * 1000.0);
    }

    pub fn track_millis(&mut self, endpoint: &str, elapsed_ms: f64) {
        let samples = self.samples.entry(endpoint.to_string()).or_default();
        samples.push_back(elapsed_ms);
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
    }

    pub fn stats(&self, endpoint: &str) -> Option<EndpointStats> {
        let samples = self.samples.get(endpoint)?;
        if samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let percentile = |p: f64| sorted[((count as f64 * p).floor() as usize).min(count - 1)];

        Some(EndpointStats {
            count,
            average: sorted.iter().sum::<f64>() / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
        })
    }

    pub fn all_stats(&self) -> BTreeMap<String, EndpointStats> {
        self.samples
            .keys()
            .filter_map(|endpoint| self.stats(endpoint).map(|s| (endpoint.clone(), s)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
