//! Sticky path-hash load balancing strategy.
//!
//! The routing key is hashed to a start index. If that backend is unhealthy the
//! pool is scanned as a ring, `start+1, start+2, …`, and the first healthy
//! backend wins. After N indices without a healthy one the key is unservable.

use crate::load_balancer::LoadBalancer;

/// 32-bit hash of a routing key: the first four bytes of its MD5 digest.
pub fn hash_key(key: &str) -> u32 {
    let digest = md5::compute(key.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Hash-selected index of `key` in a pool of `len` backends.
pub fn start_index(key: &str, len: usize) -> usize {
    (hash_key(key) as u64 % len as u64) as usize
}

/// Selector hashing the request path.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathHash;

impl PathHash {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for PathHash {
    fn next_index(&self, key: &str, health: &[bool]) -> Option<usize> {
        let len = health.len();
        if len == 0 {
            return None;
        }

        let start = start_index(key, len);
        (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&index| health[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// First generated key whose start index is `wanted`.
    fn key_for(wanted: usize, len: usize) -> String {
        (0..)
            .map(|n| format!("/x{n}"))
            .find(|key| start_index(key, len) == wanted)
            .unwrap()
    }

    fn keys() -> Vec<String> {
        (0..200).map(|n| format!("/api/v1/item/{n}")).collect()
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_key("/api/v1/some-data"), hash_key("/api/v1/some-data"));
        assert_ne!(hash_key("/a"), hash_key("/A"));
        assert_ne!(hash_key("/a"), hash_key("/a/"));
    }

    #[test]
    fn test_start_index_in_range() {
        for key in keys() {
            for len in 1..7 {
                assert!(start_index(&key, len) < len);
            }
        }
    }

    #[test]
    fn test_determinism() {
        let lb = PathHash::new();
        let health = [true, false, true, true, false];
        for key in keys() {
            let first = lb.next_index(&key, &health);
            for _ in 0..5 {
                assert_eq!(lb.next_index(&key, &health), first);
            }
        }
    }

    #[test]
    fn test_healthy_start_is_sticky() {
        let lb = PathHash::new();
        let len = 4;
        for key in keys() {
            let start = start_index(&key, len);
            // Every combination of the other backends' health.
            for mask in 0..(1u32 << len) {
                let mut health: Vec<bool> = (0..len).map(|i| mask & (1 << i) != 0).collect();
                health[start] = true;
                assert_eq!(lb.next_index(&key, &health), Some(start));
            }
        }
    }

    #[test]
    fn test_single_healthy_backend_takes_everything() {
        let lb = PathHash::new();
        for len in 1..6 {
            for healthy in 0..len {
                let mut health = vec![false; len];
                health[healthy] = true;
                for key in keys() {
                    assert_eq!(lb.next_index(&key, &health), Some(healthy));
                }
            }
        }
    }

    #[test]
    fn test_exhaustion_for_every_pool_size() {
        let lb = PathHash::new();
        for len in 0..8 {
            let health = vec![false; len];
            for key in keys() {
                assert_eq!(lb.next_index(&key, &health), None);
            }
        }
    }

    #[test]
    fn test_failover_follows_ring_order() {
        let lb = PathHash::new();
        let key = key_for(2, 3);

        // Start at 2 is down: wraps to 0.
        assert_eq!(lb.next_index(&key, &[true, true, false]), Some(0));
        // 2 and 0 down: next is 1.
        assert_eq!(lb.next_index(&key, &[false, true, false]), Some(1));
    }

    #[test]
    fn test_scenario_all_healthy() {
        let key = key_for(1, 3);
        assert_eq!(PathHash.next_index(&key, &[true, true, true]), Some(1));
    }

    #[test]
    fn test_scenario_start_unhealthy_probes_next() {
        let key = key_for(1, 3);
        assert_eq!(PathHash.next_index(&key, &[true, false, true]), Some(2));
    }

    #[test]
    fn test_scenario_none_healthy() {
        let key = key_for(1, 3);
        assert_eq!(PathHash.next_index(&key, &[false, false, false]), None);
    }
}
