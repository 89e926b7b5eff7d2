//! Prefix index from tokens to entity ids.
//!
//! Every node stores the ids of all entities owning a token that passes
//! through it, so a prefix lookup is a walk of `prefix.len()` edges and no
//! subtree traversal. Postings are roaring bitmaps, which keeps buckets in
//! ascending id order (= catalog insertion order) and makes repeated inserts
//! of the same pair free.

use crate::index::types::EntityId;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

type NodeId = u32;

const ROOT: NodeId = 0;

#[derive(Debug, Default)]
struct Node {
    children: FxHashMap<char, NodeId>,
    /// Entities with a token having this node's path as a prefix
    entities: RoaringBitmap,
    /// A complete token ends here
    terminal: bool,
}

/// Token → entity prefix index
///
/// Built single-threaded, then shared read-only; all lookups take `&self`.
#[derive(Debug)]
pub struct PrefixIndex {
    nodes: Vec<Node>,
    token_count: usize,
}

impl Default for PrefixIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefixIndex {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            token_count: 0,
        }
    }

    /// Associate `entity` with `token`. Inserting the same pair twice is a no-op.
    pub fn insert(&mut self, token: &str, entity: EntityId) {
        let mut current = ROOT;
        self.nodes[current as usize].entities.insert(entity);

        for ch in token.chars().flat_map(char::to_lowercase) {
            let existing = self.nodes[current as usize].children.get(&ch).copied();
            let next = match existing {
                Some(child) => child,
                None => {
                    let child = self.nodes.len() as NodeId;
                    self.nodes.push(Node::default());
                    self.nodes[current as usize].children.insert(ch, child);
                    child
                }
            };
            current = next;
            self.nodes[current as usize].entities.insert(entity);
        }

        let node = &mut self.nodes[current as usize];
        if !node.terminal {
            node.terminal = true;
            self.token_count += 1;
        }
    }

    /// Entities owning a token that starts with `prefix`.
    ///
    /// Borrowed from the index; `None` when no token has this prefix.
    pub fn lookup(&self, prefix: &str) -> Option<&RoaringBitmap> {
        let mut current = ROOT;
        for ch in prefix.chars().flat_map(char::to_lowercase) {
            current = *self.nodes[current as usize].children.get(&ch)?;
        }
        let entities = &self.nodes[current as usize].entities;
        if entities.is_empty() {
            None
        } else {
            Some(entities)
        }
    }

    /// Owned variant of [`lookup`](Self::lookup); empty when nothing matches
    pub fn search(&self, prefix: &str) -> RoaringBitmap {
        self.lookup(prefix).cloned().unwrap_or_default()
    }

    /// Number of distinct tokens inserted
    pub fn len(&self) -> usize {
        self.token_count
    }

    pub fn is_empty(&self) -> bool {
        self.token_count == 0
    }

    /// Number of trie nodes, including the root
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(bitmap: &RoaringBitmap) -> Vec<u32> {
        bitmap.iter().collect()
    }

    #[test]
    fn test_exact_and_prefix_search() {
        let mut index = PrefixIndex::new();
        index.insert("potion", 0);
        index.insert("portal", 1);
        index.insert("sword", 2);

        assert_eq!(ids(&index.search("potion")), vec![0]);
        assert_eq!(ids(&index.search("po")), vec![0, 1]);
        assert_eq!(ids(&index.search("s")), vec![2]);
        assert!(index.search("potions").is_empty());
        assert!(index.lookup("x").is_none());
    }

    #[test]
    fn test_empty_prefix_matches_everything() {
        let mut index = PrefixIndex::new();
        index.insert("a", 3);
        index.insert("b", 1);

        assert_eq!(ids(&index.search("")), vec![1, 3]);
    }

    #[test]
    fn test_empty_index() {
        let index = PrefixIndex::new();
        assert!(index.is_empty());
        assert!(index.lookup("").is_none());
        assert!(index.search("").is_empty());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut index = PrefixIndex::new();
        index.insert("rare", 7);
        index.insert("rare", 7);

        assert_eq!(ids(&index.search("rare")), vec![7]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_case_folding() {
        let mut index = PrefixIndex::new();
        index.insert("class=Armor", 0);

        assert_eq!(ids(&index.search("class=armor")), vec![0]);
        assert_eq!(ids(&index.search("CLASS=AR")), vec![0]);
    }

    #[test]
    fn test_token_count_and_nodes() {
        let mut index = PrefixIndex::new();
        index.insert("ab", 0);
        index.insert("a", 1);
        index.insert("abc", 2);

        assert_eq!(index.len(), 3);
        // root + a + b + c
        assert_eq!(index.node_count(), 4);
    }

    #[test]
    fn test_non_ascii_tokens() {
        let mut index = PrefixIndex::new();
        index.insert("épée", 4);

        assert_eq!(ids(&index.search("ép")), vec![4]);
        assert_eq!(ids(&index.search("ÉP")), vec![4]);
    }
}
