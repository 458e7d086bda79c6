use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A capacity- and TTL-bounded map with oldest-by-insertion eviction.
///
/// Deliberately hand-rolled instead of reaching for the `lru` crate: `lru`
/// promotes an entry's recency on read, which would violate the invariant
/// that reads never promote entries and that eviction is strictly by
/// insertion order. `insertion` tracks that order directly so capacity
/// eviction stays O(1) amortized regardless of read traffic.
pub struct TtlMap {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, (String, Instant)>,
    insertion: VecDeque<String>,
}

impl TtlMap {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            insertion: VecDeque::new(),
        }
    }

    /// Look up `key`. Expired entries are treated as absent but are not
    /// proactively removed here — `get` never mutates the map, matching
    /// "reads never promote entries."
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|(value, inserted_at)| {
            if inserted_at.elapsed() < self.ttl {
                Some(value.as_str())
            } else {
                None
            }
        })
    }

    /// Insert or overwrite `key`. If inserting a genuinely new key would
    /// exceed capacity, evicts the oldest-inserted entry first (lazily
    /// skipping any insertion-order entries that were already overwritten or
    /// expired out from under them).
    pub fn set(&mut self, key: String, value: String) {
        let is_new = !self.entries.contains_key(&key);
        self.entries.insert(key.clone(), (value, Instant::now()));
        if is_new {
            self.insertion.push_back(key);
            self.evict_if_over_capacity();
        }
    }

    fn evict_if_over_capacity(&mut self) {
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.insertion.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    /// Remove all entries whose TTL has elapsed. Not required for
    /// correctness (expired entries already read as absent) but keeps
    /// memory bounded under long-running, low-traffic sources.
    pub fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, inserted_at)| inserted_at.elapsed() < ttl);
        let live: std::collections::HashSet<&String> = self.entries.keys().collect();
        self.insertion.retain(|key| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
