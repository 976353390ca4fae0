//! Hierarchical level identifiers.
//!
//! A [`LevelId`] is an immutable chain of `(level_name, number)` segments
//! rooted at `job:0`. Identifiers are shared `Arc` nodes; a child keeps its
//! parent alive, and every node carries a stable hash chained from its
//! parent's hash.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Name of the root level.
pub const BASE_LEVEL_NAME: &str = "job";

/// One node in a hierarchical identifier chain, e.g. `job:0/run:1/event:4`.
#[derive(Debug)]
pub struct LevelId {
    parent: Option<Arc<LevelId>>,
    level_name: String,
    number: usize,
    depth: usize,
    hash: u64,
}

fn chain_hash(parent: u64, level_name: &str, number: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    parent.hash(&mut hasher);
    level_name.hash(&mut hasher);
    number.hash(&mut hasher);
    hasher.finish()
}

impl LevelId {
    /// The root identifier `job:0`.
    pub fn base() -> Arc<LevelId> {
        Arc::new(LevelId {
            parent: None,
            level_name: BASE_LEVEL_NAME.to_string(),
            number: 0,
            depth: 0,
            hash: chain_hash(0, BASE_LEVEL_NAME, 0),
        })
    }

    /// Extend the chain with a child segment.
    pub fn make_child(self: &Arc<Self>, number: usize, level_name: &str) -> Arc<LevelId> {
        Arc::new(LevelId {
            parent: Some(Arc::clone(self)),
            level_name: level_name.to_string(),
            number,
            depth: self.depth + 1,
            hash: chain_hash(self.hash, level_name, number),
        })
    }

    /// The level name of the final segment.
    pub fn level_name(&self) -> &str {
        &self.level_name
    }

    /// The number of the final segment.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Distance from the root (the base is depth 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Stable hash of the full chain.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The parent identifier, if any.
    pub fn parent(&self) -> Option<&Arc<LevelId>> {
        self.parent.as_ref()
    }

    /// Nearest self-or-ancestor segment with the given level name.
    pub fn ancestor_with(self: &Arc<Self>, level_name: &str) -> Option<Arc<LevelId>> {
        let mut current = Some(self);
        while let Some(id) = current {
            if id.level_name == level_name {
                return Some(Arc::clone(id));
            }
            current = id.parent.as_ref();
        }
        None
    }

    /// Whether `self` appears strictly above `other` in the chain.
    pub fn is_ancestor_of(&self, other: &LevelId) -> bool {
        let mut current = other.parent.as_deref();
        while let Some(id) = current {
            if id == self {
                return true;
            }
            current = id.parent.as_deref();
        }
        false
    }

    /// The chain of hashes from the root down to this segment.
    pub fn hash_chain(&self) -> Vec<u64> {
        let mut chain = Vec::with_capacity(self.depth + 1);
        let mut current = Some(self);
        while let Some(id) = current {
            chain.push(id.hash);
            current = id.parent.as_deref();
        }
        chain.reverse();
        chain
    }
}

impl PartialEq for LevelId {
    fn eq(&self, other: &Self) -> bool {
        if self.hash != other.hash || self.depth != other.depth {
            return false;
        }
        // Hash equality is overwhelmingly decisive; confirm the chain.
        self.number == other.number
            && self.level_name == other.level_name
            && match (&self.parent, &other.parent) {
                (Some(a), Some(b)) => a == b,
                (None, None) => true,
                _ => false,
            }
    }
}

impl Eq for LevelId {}

impl Hash for LevelId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = &self.parent {
            write!(f, "{parent}/")?;
        }
        write!(f, "{}:{}", self.level_name, self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_is_job_zero() {
        let base = LevelId::base();
        assert_eq!(base.level_name(), "job");
        assert_eq!(base.number(), 0);
        assert_eq!(base.depth(), 0);
        assert!(base.parent().is_none());
    }

    #[test]
    fn test_child_chain_and_display() {
        let id = LevelId::base().make_child(1, "run").make_child(4, "event");
        assert_eq!(id.depth(), 2);
        assert_eq!(id.to_string(), "job:0/run:1/event:4");
        assert_eq!(id.parent().unwrap().level_name(), "run");
    }

    #[test]
    fn test_hash_is_stable_and_chain_sensitive() {
        let a = LevelId::base().make_child(1, "event");
        let b = LevelId::base().make_child(1, "event");
        let c = LevelId::base().make_child(2, "event");
        assert_eq!(LevelId::hash(&a), LevelId::hash(&b));
        assert_eq!(a, b);
        assert_ne!(LevelId::hash(&a), LevelId::hash(&c));
        assert_ne!(a, c);
    }

    #[test]
    fn test_ancestor_with_walks_up() {
        let event = LevelId::base().make_child(1, "run").make_child(0, "event");
        assert_eq!(event.ancestor_with("event").unwrap(), event);
        assert_eq!(event.ancestor_with("run").unwrap().number(), 1);
        assert_eq!(event.ancestor_with("job").unwrap().level_name(), "job");
        assert!(event.ancestor_with("segment").is_none());
    }

    #[test]
    fn test_is_ancestor_of_is_strict() {
        let base = LevelId::base();
        let event = base.make_child(0, "event");
        assert!(base.is_ancestor_of(&event));
        assert!(!event.is_ancestor_of(&base));
        assert!(!event.is_ancestor_of(&event));
    }

    #[test]
    fn test_hash_chain_is_root_first() {
        let event = LevelId::base().make_child(0, "event");
        let chain = event.hash_chain();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], LevelId::hash(&LevelId::base()));
        assert_eq!(chain[1], LevelId::hash(&event));
    }
}
