//! Bookkeeping of the level hierarchy observed during a run.
//!
//! Tracks, per level-name path, how many store instances were seen, and can
//! render the observed layout for the end-of-run report.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use parking_lot::RwLock;

use super::level_id::LevelId;

#[derive(Debug)]
struct LevelEntry {
    name: String,
    parent_path: u64,
    count: u64,
}

/// Concurrent per-level instance counts keyed by level-name path.
#[derive(Debug, Default)]
pub struct LevelHierarchy {
    levels: RwLock<HashMap<u64, LevelEntry>>,
}

fn path_hash(id: &LevelId) -> u64 {
    let mut hasher = DefaultHasher::new();
    let mut names = Vec::with_capacity(id.depth() + 1);
    let mut current = Some(id);
    while let Some(node) = current {
        names.push(node.level_name());
        current = node.parent().map(|p| p.as_ref());
    }
    names.reverse();
    names.hash(&mut hasher);
    hasher.finish()
}

impl LevelHierarchy {
    /// An empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one observed instance of the id's level.
    pub fn increment(&self, id: &LevelId) {
        let key = path_hash(id);
        let mut levels = self.levels.write();
        if let Some(entry) = levels.get_mut(&key) {
            entry.count += 1;
            return;
        }
        let parent_path = id.parent().map(|p| path_hash(p)).unwrap_or(0);
        levels.insert(
            key,
            LevelEntry {
                name: id.level_name().to_string(),
                parent_path,
                count: 1,
            },
        );
    }

    /// Number of instances observed for the level name.
    pub fn count_for(&self, level_name: &str) -> u64 {
        self.levels
            .read()
            .values()
            .filter(|e| e.name == level_name)
            .map(|e| e.count)
            .sum()
    }

    /// Observed `(level_name, count)` pairs, parents before children.
    pub fn counts(&self) -> Vec<(String, u64)> {
        let levels = self.levels.read();
        let mut pairs: Vec<_> = levels
            .values()
            .map(|e| (e.name.clone(), e.count, e.parent_path))
            .collect();
        // Roots (parent path 0) first, then by name for determinism.
        pairs.sort_by(|a, b| (a.2 != 0, &a.0).cmp(&(b.2 != 0, &b.0)));
        pairs.into_iter().map(|(name, count, _)| (name, count)).collect()
    }

    /// Pretty-print the observed layout as an indented tree.
    pub fn graph_layout(&self) -> String {
        let levels = self.levels.read();
        let mut out = String::new();
        let roots: Vec<u64> = levels
            .iter()
            .filter(|(_, e)| e.parent_path == 0)
            .map(|(k, _)| *k)
            .collect();
        for root in roots {
            Self::render(&levels, root, "", &mut out);
        }
        out
    }

    fn render(levels: &HashMap<u64, LevelEntry>, key: u64, indent: &str, out: &mut String) {
        let Some(entry) = levels.get(&key) else {
            return;
        };
        out.push_str(&format!("{indent}{}: {}\n", entry.name, entry.count));
        let mut children: Vec<u64> = levels
            .iter()
            .filter(|(_, e)| e.parent_path == key)
            .map(|(k, _)| *k)
            .collect();
        children.sort();
        let child_indent = format!("{indent}  ");
        for child in children {
            Self::render(levels, child, &child_indent, out);
        }
    }

    /// Log the observed layout at info level.
    pub fn log_layout(&self) {
        for line in self.graph_layout().lines() {
            tracing::info!(target: "phlex_core::hierarchy", "{line}");
        }
    }
}
