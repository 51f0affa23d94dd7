//! Per-resource alert cooldown. Check-and-set happens under the resource's shard
//! lock, so concurrent admits for one resource cannot both pass.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const SHARDS: usize = 16;

pub struct AlertSuppressor {
    cooldown_secs: i64,
    last_alerted: Vec<Mutex<HashMap<String, i64>>>,
}

impl AlertSuppressor {
    pub fn new(cooldown_secs: i64) -> Self {
        Self {
            cooldown_secs: cooldown_secs.max(0),
            last_alerted: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, resource: &str) -> &Mutex<HashMap<String, i64>> {
        let mut h = DefaultHasher::new();
        resource.hash(&mut h);
        &self.last_alerted[(h.finish() % SHARDS as u64) as usize]
    }

    /// True (and records `now`) when nothing was admitted for `resource` within the
    /// cooldown; false without mutation otherwise. Timestamps before the last admitted
    /// one are suppressed.
    pub fn admit(&self, resource: &str, now: i64) -> bool {
        let mut window = self.shard(resource).lock();
        match window.get(resource) {
            Some(&last) if now - last < self.cooldown_secs => false,
            _ => {
                window.insert(resource.to_string(), now);
                true
            }
        }
    }

    pub fn last_alerted(&self, resource: &str) -> Option<i64> {
        self.shard(resource).lock().get(resource).copied()
    }

    pub fn cooldown_secs(&self) -> i64 {
        self.cooldown_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn cooldown_boundary_is_inclusive() {
        let s = AlertSuppressor::new(300);
        assert!(s.admit("p", 1000));
        assert!(!s.admit("p", 1299));
        assert_eq!(s.last_alerted("p"), Some(1000));
        assert!(s.admit("p", 1300));
        assert!(!s.admit("p", 1200));
        assert!(s.admit("q", 1200));
    }

    #[test]
    fn concurrent_admits_for_one_resource_pass_once() {
        let s = Arc::new(AlertSuppressor::new(60));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&s);
                std::thread::spawn(move || s.admit("p", 500))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
