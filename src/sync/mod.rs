pub mod output;
pub mod scanner;
pub mod strategy;
pub mod transfer;

use crate::device::DestinationResolver;
use crate::error::{Result, SyncError};
use crate::filter::IgnoreMatcher;
use output::{Reporter, SkipReason, SyncEvent};
use scanner::{Scanner, PYTHON_EXTENSIONS};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use strategy::{SyncAction, SyncPlan, SyncPlanner, PROTECTED_DIR};
use transfer::{ExecutionReport, Executor, Outcome};

/// Everything a deploy needs, already merged from flags and config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub source: PathBuf,
    /// `None` means ask the resolver
    pub destination: Option<PathBuf>,
    pub delete: bool,
    pub use_gitignore: bool,
    pub dry_run: bool,
}

impl DeployOptions {
    /// Resolve both roots to existing, non-overlapping directories
    ///
    /// Runs before anything is read from or written to the destination.
    pub fn resolve_roots(&self, resolver: &dyn DestinationResolver) -> Result<(PathBuf, PathBuf)> {
        let source = existing_dir(&self.source).ok_or_else(|| SyncError::SourceNotFound {
            path: self.source.clone(),
        })?;

        let destination = match &self.destination {
            Some(destination) => destination.clone(),
            None => resolver.resolve().ok_or(SyncError::NoDestinationFound)?,
        };
        let destination =
            existing_dir(&destination).ok_or(SyncError::DestinationNotFound { path: destination })?;

        if source.starts_with(&destination) || destination.starts_with(&source) {
            return Err(SyncError::Config(format!(
                "Source {} and destination {} overlap",
                source.display(),
                destination.display()
            )));
        }

        Ok((source, destination))
    }
}

fn existing_dir(path: &Path) -> Option<PathBuf> {
    path.canonicalize().ok().filter(|p| p.is_dir())
}

pub struct SyncEngine {
    dry_run: bool,
    delete: bool,
    use_gitignore: bool,
    cancel: Arc<AtomicBool>,
}

impl SyncEngine {
    pub fn new(options: &DeployOptions, cancel: Arc<AtomicBool>) -> Self {
        Self {
            dry_run: options.dry_run,
            delete: options.delete,
            use_gitignore: options.use_gitignore,
            cancel,
        }
    }

    /// Scan both sides and work out what to do; touches nothing
    pub fn plan(&self, source: &Path, destination: &Path) -> SyncPlan {
        let matcher = if self.use_gitignore {
            IgnoreMatcher::build(source)
        } else {
            IgnoreMatcher::disabled()
        };
        if matcher.is_enabled() {
            tracing::debug!("Using {} .gitignore file(s)", matcher.rule_file_count());
        }

        tracing::debug!("Scanning {} and {}", source.display(), destination.display());
        let source_scanner = Scanner::new(source)
            .with_extensions(PYTHON_EXTENSIONS)
            .with_matcher(&matcher)
            .follow_links(true);
        let dest_scanner = Scanner::new(destination).with_extensions(PYTHON_EXTENSIONS);

        let plan = SyncPlanner::new(PROTECTED_DIR, self.delete).plan(source_scanner.scan(), dest_scanner.scan());
        if plan.is_empty() {
            tracing::info!("Nothing to copy or delete");
        }
        plan
    }

    /// Plan and apply a deploy, reporting every decision along the way
    pub fn sync(&self, source: &Path, destination: &Path, reporter: &mut dyn Reporter) -> ExecutionReport {
        let start_time = Instant::now();
        tracing::info!("Starting deploy: {} → {}", source.display(), destination.display());

        let plan = self.plan(source, destination);

        reporter.report(&SyncEvent::Start {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            total_actions: plan.action_count(),
            dry_run: self.dry_run,
        });
        for path in &plan.protected {
            reporter.report(&SyncEvent::Protected {
                path: PathBuf::from(path),
            });
        }
        for path in &plan.kept {
            reporter.report(&SyncEvent::Skip {
                path: PathBuf::from(path),
                reason: SkipReason::DeletionDisabled,
            });
        }

        let report = Executor::new(self.dry_run, Arc::clone(&self.cancel))
            .execute(&plan, source, destination, reporter);

        let count = |outcome: fn(&Outcome) -> bool| {
            report.records.iter().filter(|r| outcome(&r.outcome)).count()
        };
        let files_failed = count(|o| matches!(o, Outcome::Failed(_)));
        let files_interrupted = count(|o| *o == Outcome::Interrupted);

        reporter.report(&SyncEvent::Summary {
            files_copied: report.completed(SyncAction::Copy),
            files_deleted: report.completed(SyncAction::Delete),
            files_kept: plan.kept.len(),
            files_protected: plan.protected.len(),
            files_failed,
            files_interrupted,
            dirs_removed: report.removed_dirs.len(),
            bytes_copied: report.bytes_copied,
            duration_secs: start_time.elapsed().as_secs_f64(),
            dry_run: self.dry_run,
        });

        tracing::info!(
            "Deploy complete: {} copied, {} deleted, {} failed",
            report.completed(SyncAction::Copy),
            report.completed(SyncAction::Delete),
            files_failed
        );

        report
    }
}
