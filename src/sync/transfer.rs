use super::output::{Reporter, SyncEvent};
use super::strategy::{SyncAction, SyncPlan};
use crate::error::{FileOpKind, SyncError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Applied to the destination
    Done,
    /// Dry run; nothing was touched
    Simulated,
    /// The operation failed; the message says why
    Failed(String),
    /// Not attempted because the run was cancelled
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub action: SyncAction,
    pub path: String,
    pub outcome: Outcome,
}

/// Result of applying a plan: one record per planned action, in plan order
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub records: Vec<ActionRecord>,
    /// Destination directories removed because deletions left them empty
    pub removed_dirs: Vec<String>,
    pub bytes_copied: u64,
}

impl ExecutionReport {
    /// The planned action list, independent of how each action turned out
    pub fn planned(&self) -> Vec<(SyncAction, &str)> {
        self.records
            .iter()
            .map(|r| (r.action, r.path.as_str()))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn was_interrupted(&self) -> bool {
        self.records.iter().any(|r| r.outcome == Outcome::Interrupted)
    }

    /// Copies or deletions that were applied (or would be, in a dry run)
    pub fn completed(&self, action: SyncAction) -> usize {
        self.records
            .iter()
            .filter(|r| r.action == action)
            .filter(|r| matches!(r.outcome, Outcome::Done | Outcome::Simulated))
            .count()
    }
}

pub struct Executor {
    dry_run: bool,
    cancel: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(dry_run: bool, cancel: Arc<AtomicBool>) -> Self {
        Self { dry_run, cancel }
    }

    /// Apply `plan`: every copy first, then every deletion, then prune
    /// directories the deletions emptied
    ///
    /// Per-file failures are recorded and do not stop the run. Once
    /// cancellation is requested the current file finishes and the rest are
    /// recorded as interrupted.
    pub fn execute(
        &self,
        plan: &SyncPlan,
        source_root: &Path,
        dest_root: &Path,
        reporter: &mut dyn Reporter,
    ) -> ExecutionReport {
        let mut report = ExecutionReport {
            records: Vec::with_capacity(plan.action_count()),
            ..Default::default()
        };
        let mut emptied_candidates = Vec::new();
        let mut interrupted = false;
        let resolved_root = dest_root.canonicalize().unwrap_or_else(|_| dest_root.to_path_buf());
        let dest_root = resolved_root.as_path();

        for (index, (action, path)) in plan.actions().enumerate() {
            let outcome = if interrupted || self.cancel.load(Ordering::SeqCst) {
                if !interrupted {
                    interrupted = true;
                    let err = SyncError::Interrupted {
                        remaining: plan.action_count() - index,
                    };
                    tracing::warn!("{}", err);
                }
                Outcome::Interrupted
            } else if self.dry_run {
                tracing::debug!("Would {:?}: {}", action, path);
                Outcome::Simulated
            } else {
                match action {
                    SyncAction::Copy => {
                        match self.copy_file(&source_root.join(path), dest_root, &dest_root.join(path)) {
                            Ok(bytes) => {
                                report.bytes_copied += bytes;
                                Outcome::Done
                            }
                            Err(e) => Outcome::Failed(e.to_string()),
                        }
                    }
                    SyncAction::Delete => match self.delete_file(dest_root, &dest_root.join(path)) {
                        Ok(()) => {
                            emptied_candidates.push(path.to_string());
                            Outcome::Done
                        }
                        Err(e) => Outcome::Failed(e.to_string()),
                    },
                }
            };

            let record = ActionRecord {
                action,
                path: path.to_string(),
                outcome,
            };
            reporter.report(&SyncEvent::from_record(&record));
            report.records.push(record);
        }

        if !self.dry_run && !interrupted {
            for path in &emptied_candidates {
                self.prune_empty_parents(
                    dest_root,
                    &plan.protected_dir,
                    path,
                    &mut report.removed_dirs,
                    reporter,
                );
            }
        }

        report
    }

    fn copy_file(&self, source: &Path, dest_root: &Path, dest: &Path) -> Result<u64, SyncError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| file_op(FileOpKind::CreateDir, parent, e))?;
        }
        ensure_inside(dest_root, dest).map_err(|e| file_op(FileOpKind::Copy, dest, e))?;

        let bytes = fs::copy(source, dest).map_err(|e| file_op(FileOpKind::Copy, dest, e))?;
        tracing::debug!("Copied: {} -> {}", source.display(), dest.display());
        Ok(bytes)
    }

    fn delete_file(&self, dest_root: &Path, dest: &Path) -> Result<(), SyncError> {
        ensure_inside(dest_root, dest).map_err(|e| file_op(FileOpKind::Delete, dest, e))?;
        fs::remove_file(dest).map_err(|e| file_op(FileOpKind::Delete, dest, e))?;
        tracing::debug!("Deleted: {}", dest.display());
        Ok(())
    }

    /// Walk up from a deleted file removing directories that are now empty
    ///
    /// Stops at the destination root, at the protected directory, and at the
    /// first directory that still has entries.
    fn prune_empty_parents(
        &self,
        dest_root: &Path,
        protected_dir: &str,
        deleted: &str,
        removed: &mut Vec<String>,
        reporter: &mut dyn Reporter,
    ) {
        let mut relative = parent_of(deleted);

        while let Some(dir) = relative {
            if dir == protected_dir || dir.starts_with(&format!("{}/", protected_dir)) {
                break;
            }

            let absolute = dest_root.join(dir);
            let is_empty = match fs::read_dir(&absolute) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => false,
            };
            if !is_empty {
                break;
            }

            if let Err(e) = fs::remove_dir(&absolute) {
                file_op(FileOpKind::RemoveDir, &absolute, e);
                break;
            }

            tracing::debug!("Removed empty directory: {}", absolute.display());
            reporter.report(&SyncEvent::DirRemoved {
                path: PathBuf::from(dir),
            });
            removed.push(dir.to_string());
            relative = parent_of(dir);
        }
    }
}

/// Refuse to write or remove anything whose directory resolves outside the
/// destination root, e.g. through a symlinked directory on the device
fn ensure_inside(dest_root: &Path, dest: &Path) -> std::io::Result<()> {
    let Some(parent) = dest.parent() else {
        return Ok(());
    };
    let resolved = parent.canonicalize()?;
    if resolved.starts_with(dest_root) {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("resolves outside the destination ({})", resolved.display()),
        ))
    }
}

fn parent_of(relative: &str) -> Option<&str> {
    relative.rsplit_once('/').map(|(parent, _)| parent)
}

fn file_op(op: FileOpKind, path: &Path, source: std::io::Error) -> SyncError {
    let err = SyncError::FileOp {
        op,
        path: path.to_path_buf(),
        source,
    };
    tracing::warn!("{}", err);
    err
}
