//! In-process response cache.
//!
//! Entries carry an optional absolute expiry and are evicted in insertion
//! order once the configured entry cap is reached. Expiry is lazy: an expired
//! entry is only dropped when a later `get` finds it.

use crate::errors::GatewayError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};


pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Option<Instant>,
    seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: String,
    pub size: usize,
    pub max_size: usize,
}

pub struct CacheManager<V> {
    entries: HashMap<String, CacheEntry<V>>,
    // (sequence, key) in insertion order; may hold stale pairs for deleted keys
    order: VecDeque<(u64, String)>,
    next_seq: u64,
    max_size: usize,
    default_ttl: Duration,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V: Clone> CacheManager<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
            max_size: max_size.max(1),
            default_ttl,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Builds `prefix:k1=v1:k2=v2` with parameters sorted by name.
    ///
    /// Only scalar values are accepted; nested arrays or objects must be
    /// serialized by the caller first.
    pub fn generate_key(prefix: &str, params: &Map<String, Value>) -> Result<String, GatewayError> {
        let mut pairs = Vec::with_capacity(params.len());
        for (name, value) in params {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => "null".to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(GatewayError::InvalidCacheKey(format!(
                        "parameter '{}' is not a scalar value",
                        name
                    )));
                }
            };
            pairs.push(format!("{}={}", name, rendered));
        }
        pairs.sort();

        let mut key = String::from(prefix);
        for pair in pairs {
            key.push(':');
            key.push_str(&pair);
        }
        Ok(key)
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => entry.expires_at.is_some_and(|at| now >= at),
        };

        if expired {
            self.entries.remove(key);
            self.misses += 1;
            return None;
        }

        self.hits += 1;
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let ttl = self.default_ttl;
        self.set_at(key, value, ttl, Instant::now());
    }

    /// A zero `ttl` stores the value without expiry.
    pub fn set_with_ttl(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn set_at(&mut self, key: impl Into<String>, value: V, ttl: Duration, now: Instant) {
        let key = key.into();
        // Zero, or a ttl too large to represent, means no expiry.
        let expires_at = if ttl.is_zero() { None } else { now.checked_add(ttl) };

        // Overwrites keep the key's insertion position.
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        if self.entries.len() >= self.max_size {
            self.evict_oldest();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, key.clone()));
        self.entries.insert(key, CacheEntry { value, expires_at, seq });
        self.compact_order();
    }

    /// Presence check only: touches neither statistics nor expired entries.
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every entry. Cumulative counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Currently held keys, oldest first.
    pub fn keys(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|(seq, key)| self.is_live(*seq, key))
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Removes every key under `prefix:` and returns how many were removed.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let namespace = format!("{}:", prefix);
        let doomed: Vec<String> = self
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(&namespace))
            .collect();

        for key in &doomed {
            self.delete(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total == 0 {
            "N/A".to_string()
        } else {
            format!("{:.2}%", self.hits as f64 / total as f64 * 100.0)
        };

        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            hit_rate,
            size: self.entries.len(),
            max_size: self.max_size,
        }
    }

    fn is_live(&self, seq: u64, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.seq == seq)
    }

    fn evict_oldest(&mut self) {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.is_live(seq, &key) {
                self.entries.remove(&key);
                self.evictions += 1;
                return;
            }
        }
    }

    fn compact_order(&mut self) {
        if self.order.len() <= self.max_size.saturating_mul(2) {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(seq, key)| entries.get(key).is_some_and(|entry| entry.seq == *seq));
    }
}
