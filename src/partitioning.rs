//! Consistent-hash partitioning advisory: maps a user id to a logical node
//! for capacity planning. Informational only — it never gates routing or
//! replication decisions, only `GET /api/partitioning/stats`.

use std::collections::BTreeMap;

const VIRTUAL_NODES_PER_PHYSICAL: u32 = 150;

fn fnv1a(key: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    key.bytes().fold(OFFSET_BASIS, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

/// A ring of virtual nodes mapped to physical node names, looked up by
/// smallest key greater than or equal to a point's hash (wrapping at the end
/// of the ring).
pub struct ConsistentHashRing {
    ring: BTreeMap<u64, String>,
}

impl ConsistentHashRing {
    pub fn new(nodes: &[String]) -> Self {
        let mut ring = Self { ring: BTreeMap::new() };
        for node in nodes {
            ring.add_node(node);
        }
        ring
    }

    pub fn add_node(&mut self, node: &str) {
        for i in 0..VIRTUAL_NODES_PER_PHYSICAL {
            let virtual_key = format!("{node}:{i}");
            self.ring.insert(fnv1a(&virtual_key), node.to_string());
        }
    }

    pub fn remove_node(&mut self, node: &str) {
        for i in 0..VIRTUAL_NODES_PER_PHYSICAL {
            let virtual_key = format!("{node}:{i}");
            self.ring.remove(&fnv1a(&virtual_key));
        }
    }

    pub fn node_for(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }
        let hash = fnv1a(key);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node.as_str())
    }

    pub fn distribution(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for node in self.ring.values() {
            *counts.entry(node.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_always_maps_to_same_node() {
        let ring = ConsistentHashRing::new(&["a".to_string(), "b".to_string(), "c".to_string()]);
        let first = ring.node_for("user-42").map(String::from);
        let second = ring.node_for("user-42").map(String::from);
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn removing_a_node_redistributes_its_keys() {
        let mut ring = ConsistentHashRing::new(&["a".to_string(), "b".to_string()]);
        let before = ring.node_for("user-1").map(String::from);
        ring.remove_node(before.as_deref().unwrap());
        let after = ring.node_for("user-1");
        assert_ne!(after, before.as_deref());
    }
}
