//! C11: consistent hash ring with virtual nodes and hash-tag-aware
//! routing, grounded 1:1 on `pkg/consistenthash/consistenthash.go`
//! (spec.md §4.11 is close to a transcription of it).

use crc::{CRC_32_ISO_HDLC, Crc};

/// CRC32 with the IEEE polynomial, matching the Go original's
/// `crc32.ChecksumIEEE`.
const CRC32_IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A sorted set of virtual-node hashes, each bound to a physical node id.
/// `AddNode`/`PickNode` are pure given a fixed node set and `replicas`.
pub struct ConsistentHashRing {
    replicas: usize,
    ring: Vec<(u32, String)>,
}

impl ConsistentHashRing {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            ring: Vec::new(),
        }
    }

    /// Inserts `replicas` virtual nodes per id, keyed by
    /// `CRC32(str(i) + id)`. Idempotent re-adds would duplicate virtual
    /// nodes; callers add each physical id once at startup (runtime
    /// membership changes are out of scope).
    pub fn add_node(&mut self, ids: &[String]) {
        for id in ids {
            for i in 0..self.replicas {
                let hash = CRC32_IEEE.checksum(format!("{i}{id}").as_bytes());
                self.ring.push((hash, id.clone()));
            }
        }
        self.ring.sort_by_key(|(hash, _)| *hash);
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// The substring between the first `{` and the first subsequent `}`,
    /// if nonempty; otherwise the whole key. Lets callers force related
    /// keys onto the same node with a shared tag.
    fn hash_tag(key: &[u8]) -> &[u8] {
        if let Some(start) = key.iter().position(|&b| b == b'{')
            && let Some(end_offset) = key[start + 1..].iter().position(|&b| b == b'}')
        {
            let end = start + 1 + end_offset;
            if end > start + 1 {
                return &key[start + 1..end];
            }
        }
        key
    }

    /// Smallest virtual-node hash >= the key's hash, wrapping to index 0
    /// if none. `None` only when the ring has no nodes.
    pub fn pick_node(&self, key: &[u8]) -> Option<String> {
        if self.ring.is_empty() {
            return None;
        }
        let hash = CRC32_IEEE.checksum(Self::hash_tag(key));
        let idx = self.ring.partition_point(|(h, _)| *h < hash);
        let idx = if idx == self.ring.len() { 0 } else { idx };
        Some(self.ring[idx].1.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_node_is_pure_for_a_fixed_node_set() {
        let mut ring = ConsistentHashRing::new(4);
        ring.add_node(&["a".to_string(), "b".to_string(), "c".to_string()]);
        let first = ring.pick_node(b"some-key");
        let second = ring.pick_node(b"some-key");
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn hash_tagged_keys_route_together() {
        let mut ring = ConsistentHashRing::new(8);
        ring.add_node(&["a".to_string(), "b".to_string(), "c".to_string()]);
        let p1 = ring.pick_node(b"user:{42}:profile");
        let p2 = ring.pick_node(b"user:{42}:settings");
        assert_eq!(p1, p2);
    }

    #[test]
    fn empty_braces_fall_back_to_whole_key() {
        let mut ring = ConsistentHashRing::new(4);
        ring.add_node(&["a".to_string()]);
        // "{}" has no content between the braces, so the whole key hashes.
        assert_eq!(ring.pick_node(b"k{}"), ring.pick_node(b"k{}"));
    }

    #[test]
    fn empty_ring_picks_nothing() {
        let ring = ConsistentHashRing::new(4);
        assert_eq!(ring.pick_node(b"x"), None);
    }

    #[test]
    fn distributes_across_all_added_nodes() {
        let mut ring = ConsistentHashRing::new(16);
        let ids: Vec<String> = (0..5).map(|i| format!("node-{i}")).collect();
        ring.add_node(&ids);
        let mut hit = std::collections::HashSet::new();
        for i in 0..200 {
            let key = format!("key-{i}");
            hit.insert(ring.pick_node(key.as_bytes()).unwrap());
        }
        assert!(hit.len() > 1, "200 keys should spread across more than one node");
    }
}
