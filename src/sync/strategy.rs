use super::scanner::FileEntry;
use std::collections::BTreeSet;

/// Device directory managed by circup; never written to or cleaned up
pub const PROTECTED_DIR: &str = "lib";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Copy - source file is written to the destination (always overwrites)
    Copy,
    /// Delete - destination file has no counterpart in the source
    Delete,
}

/// What a deploy will do, computed before any I/O
///
/// All sets are disjoint and iterate in lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_copy: BTreeSet<String>,
    pub to_delete: BTreeSet<String>,
    /// Stale destination files left alone because deletion is disabled
    pub kept: BTreeSet<String>,
    /// Paths on either side that fall under the protected directory
    pub protected: BTreeSet<String>,
    /// The protected directory this plan was computed with
    pub protected_dir: String,
}

impl Default for SyncPlan {
    fn default() -> Self {
        Self {
            to_copy: BTreeSet::new(),
            to_delete: BTreeSet::new(),
            kept: BTreeSet::new(),
            protected: BTreeSet::new(),
            protected_dir: PROTECTED_DIR.to_string(),
        }
    }
}

impl SyncPlan {
    /// Planned actions in execution order: every copy, then every delete
    pub fn actions(&self) -> impl Iterator<Item = (SyncAction, &str)> + '_ {
        self.to_copy
            .iter()
            .map(|p| (SyncAction::Copy, p.as_str()))
            .chain(self.to_delete.iter().map(|p| (SyncAction::Delete, p.as_str())))
    }

    pub fn action_count(&self) -> usize {
        self.to_copy.len() + self.to_delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.action_count() == 0
    }
}

pub struct SyncPlanner {
    protected_prefix: String,
    delete_enabled: bool,
}

impl SyncPlanner {
    pub fn new(protected_prefix: impl Into<String>, delete_enabled: bool) -> Self {
        Self {
            protected_prefix: protected_prefix.into(),
            delete_enabled,
        }
    }

    /// Diff two scans into a plan
    ///
    /// Pure: only the relative paths are looked at. Every eligible source
    /// file is copied since contents are never compared. Destination files
    /// with no source counterpart are deleted, or reported as `kept` when
    /// deletion is off, unless they sit under the protected directory.
    pub fn plan<S, D>(&self, source: S, destination: D) -> SyncPlan
    where
        S: IntoIterator<Item = FileEntry>,
        D: IntoIterator<Item = FileEntry>,
    {
        let mut plan = SyncPlan {
            protected_dir: self.protected_prefix.clone(),
            ..Default::default()
        };

        for entry in source {
            if self.is_protected(&entry.relative_path) {
                plan.protected.insert(entry.relative_path);
            } else {
                plan.to_copy.insert(entry.relative_path);
            }
        }

        for entry in destination {
            if self.is_protected(&entry.relative_path) {
                plan.protected.insert(entry.relative_path);
            } else if !plan.to_copy.contains(&entry.relative_path) {
                if self.delete_enabled {
                    plan.to_delete.insert(entry.relative_path);
                } else {
                    plan.kept.insert(entry.relative_path);
                }
            }
        }

        tracing::debug!(
            "Planned {} copies, {} deletions ({} kept, {} protected)",
            plan.to_copy.len(),
            plan.to_delete.len(),
            plan.kept.len(),
            plan.protected.len()
        );

        plan
    }

    /// Whether the first segment of `relative_path` is the protected directory
    pub fn is_protected(&self, relative_path: &str) -> bool {
        relative_path.split('/').next() == Some(self.protected_prefix.as_str())
            && relative_path.contains('/')
    }
}

impl Default for SyncPlanner {
    fn default() -> Self {
        Self::new(PROTECTED_DIR, true)
    }
}
