use super::strategy::SyncAction;
use super::transfer::{ActionRecord, Outcome};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// One decision or result of a deploy, in the order it happened
///
/// Serialized as NDJSON for `--json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Start {
        source: PathBuf,
        destination: PathBuf,
        total_actions: usize,
        dry_run: bool,
    },
    Copy {
        path: PathBuf,
        dry_run: bool,
    },
    Delete {
        path: PathBuf,
        dry_run: bool,
    },
    Skip {
        path: PathBuf,
        reason: SkipReason,
    },
    Protected {
        path: PathBuf,
    },
    Error {
        path: PathBuf,
        action: &'static str,
        error: String,
    },
    DirRemoved {
        path: PathBuf,
    },
    Summary {
        files_copied: usize,
        files_deleted: usize,
        files_kept: usize,
        files_protected: usize,
        files_failed: usize,
        files_interrupted: usize,
        dirs_removed: usize,
        bytes_copied: u64,
        duration_secs: f64,
        dry_run: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Stale on the device, but `--no-delete` was given
    DeletionDisabled,
    /// Never attempted because the run was cancelled
    Interrupted,
}

impl SyncEvent {
    pub fn from_record(record: &ActionRecord) -> Self {
        let path = PathBuf::from(&record.path);
        match (&record.outcome, record.action) {
            (Outcome::Done | Outcome::Simulated, SyncAction::Copy) => SyncEvent::Copy {
                path,
                dry_run: record.outcome == Outcome::Simulated,
            },
            (Outcome::Done | Outcome::Simulated, SyncAction::Delete) => SyncEvent::Delete {
                path,
                dry_run: record.outcome == Outcome::Simulated,
            },
            (Outcome::Failed(error), action) => SyncEvent::Error {
                path,
                action: match action {
                    SyncAction::Copy => "copy",
                    SyncAction::Delete => "delete",
                },
                error: error.clone(),
            },
            (Outcome::Interrupted, _) => SyncEvent::Skip {
                path,
                reason: SkipReason::Interrupted,
            },
        }
    }

    /// Emit this event as JSON to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }
}

/// Receives every event of a deploy
pub trait Reporter {
    fn report(&mut self, event: &SyncEvent);
}

impl Reporter for Vec<SyncEvent> {
    fn report(&mut self, event: &SyncEvent) {
        self.push(event.clone());
    }
}

/// Newline-delimited JSON on stdout
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&mut self, event: &SyncEvent) {
        event.emit();
    }
}

/// Terminal output with colors and a progress bar
pub struct HumanReporter {
    quiet: bool,
    verbose: bool,
    progress: Option<ProgressBar>,
}

impl HumanReporter {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self {
            quiet,
            verbose,
            progress: None,
        }
    }

    fn line(&self, text: String) {
        if self.quiet {
            return;
        }
        match &self.progress {
            Some(pb) => pb.suspend(|| println!("{}", text)),
            None => println!("{}", text),
        }
    }

    fn error_line(&self, text: String) {
        match &self.progress {
            Some(pb) => pb.suspend(|| eprintln!("{}", text)),
            None => eprintln!("{}", text),
        }
    }

    fn tick(&self) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }
}

impl Reporter for HumanReporter {
    fn report(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::Start {
                source,
                destination,
                total_actions,
                dry_run,
            } => {
                self.line(format!("From: {}", source.display()));
                self.line(format!("  To: {}\n", destination.display()));
                if *dry_run {
                    self.line("Mode: Dry-run (no changes will be made)\n".to_string());
                } else if !self.quiet && *total_actions > 0 {
                    let pb = ProgressBar::new(*total_actions as u64);
                    if let Ok(style) = ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    {
                        pb.set_style(style.progress_chars("#>-"));
                    }
                    self.progress = Some(pb);
                }
            }
            SyncEvent::Copy { path, dry_run } => {
                let verb = if *dry_run { "Would copy" } else { "Copying" };
                self.line(format!(
                    "{} ./{} to ./{}",
                    verb.green(),
                    path.display(),
                    path.display()
                ));
                self.tick();
            }
            SyncEvent::Delete { path, dry_run } => {
                let verb = if *dry_run { "Would delete" } else { "Deleting" };
                self.line(format!("{} ./{}", verb.red(), path.display()));
                self.tick();
            }
            SyncEvent::Skip { path, reason } => match reason {
                SkipReason::DeletionDisabled => {
                    if self.verbose {
                        self.line(format!(
                            "{} ./{} (deletion disabled)",
                            "Keeping".yellow(),
                            path.display()
                        ));
                    }
                }
                SkipReason::Interrupted => {
                    self.line(format!(
                        "{} ./{} (interrupted)",
                        "Skipped".bright_black(),
                        path.display()
                    ));
                    self.tick();
                }
            },
            SyncEvent::Protected { path } => {
                if self.verbose {
                    self.line(format!(
                        "{} ./{}",
                        "Protected".bright_black(),
                        path.display()
                    ));
                }
            }
            SyncEvent::Error {
                path,
                action,
                error,
            } => {
                self.error_line(format!(
                    "{} {} ./{}: {}",
                    "Error".red().bold(),
                    action,
                    path.display(),
                    error
                ));
                self.tick();
            }
            SyncEvent::DirRemoved { path } => {
                if self.verbose {
                    self.line(format!(
                        "{} ./{}/",
                        "Removed empty".bright_black(),
                        path.display()
                    ));
                }
            }
            SyncEvent::Summary {
                files_copied,
                files_deleted,
                files_kept,
                files_protected,
                files_failed,
                files_interrupted,
                dirs_removed,
                bytes_copied,
                duration_secs,
                dry_run,
            } => {
                if let Some(pb) = self.progress.take() {
                    pb.finish_and_clear();
                }

                if *files_failed > 0 {
                    self.line(format!(
                        "\n{}\n",
                        format!("✗ Deploy finished with {} error(s)", files_failed)
                            .red()
                            .bold()
                    ));
                } else if *files_interrupted > 0 {
                    self.line(format!("\n{}\n", "✗ Deploy interrupted".yellow().bold()));
                } else if *dry_run {
                    self.line(format!(
                        "\n{}\n",
                        "✓ Dry-run complete (no changes made)".green().bold()
                    ));
                } else {
                    self.line(format!("\n{}\n", "✓ Deploy complete".green().bold()));
                }

                let (copied, deleted) = if *dry_run {
                    ("  Would copy:        ", "  Would delete:      ")
                } else {
                    ("  Files copied:      ", "  Files deleted:     ")
                };
                self.line(format!("{}{}", copied, files_copied.to_string().green()));
                self.line(format!("{}{}", deleted, files_deleted.to_string().red()));
                if *files_kept > 0 {
                    self.line(format!(
                        "  Kept (no delete):  {}",
                        files_kept.to_string().yellow()
                    ));
                }
                self.line(format!(
                    "  Protected (lib/):  {}",
                    files_protected.to_string().bright_black()
                ));
                if *dirs_removed > 0 {
                    self.line(format!(
                        "  Dirs removed:      {}",
                        dirs_removed.to_string().bright_black()
                    ));
                }
                if *files_interrupted > 0 {
                    self.line(format!(
                        "  Not applied:       {}",
                        files_interrupted.to_string().yellow()
                    ));
                }
                if *files_failed > 0 {
                    self.line(format!(
                        "  Failed:            {}",
                        files_failed.to_string().red()
                    ));
                }
                if !*dry_run {
                    self.line(String::new());
                    self.line(format!(
                        "  Bytes copied:      {}",
                        format_bytes(*bytes_copied).cyan()
                    ));
                    self.line(format!(
                        "  Duration:          {}",
                        format_duration(Duration::from_secs_f64(*duration_secs)).cyan()
                    ));
                }
            }
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_start_event() {
        let event = SyncEvent::Start {
            source: PathBuf::from("/src"),
            destination: PathBuf::from("/media/CIRCUITPY"),
            total_actions: 12,
            dry_run: true,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"start"#));
        assert!(json.contains(r#""total_actions":12"#));
        assert!(json.contains(r#""dry_run":true"#));
    }

    #[test]
    fn test_serialize_skip_reason() {
        let event = SyncEvent::Skip {
            path: PathBuf::from("stale.py"),
            reason: SkipReason::DeletionDisabled,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"skip"#));
        assert!(json.contains(r#""reason":"deletion_disabled"#));
    }

    #[test]
    fn test_serialize_dir_removed_event() {
        let event = SyncEvent::DirRemoved {
            path: PathBuf::from("pkg"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"dir_removed"#));
    }

    #[test]
    fn test_event_from_record() {
        let simulated = ActionRecord {
            action: SyncAction::Copy,
            path: "code.py".into(),
            outcome: Outcome::Simulated,
        };
        assert_eq!(
            SyncEvent::from_record(&simulated),
            SyncEvent::Copy {
                path: PathBuf::from("code.py"),
                dry_run: true
            }
        );

        let failed = ActionRecord {
            action: SyncAction::Delete,
            path: "old.py".into(),
            outcome: Outcome::Failed("read-only file system".into()),
        };
        match SyncEvent::from_record(&failed) {
            SyncEvent::Error { action, error, .. } => {
                assert_eq!(action, "delete");
                assert_eq!(error, "read-only file system");
            }
            other => panic!("unexpected event {:?}", other),
        }

        let interrupted = ActionRecord {
            action: SyncAction::Copy,
            path: "code.py".into(),
            outcome: Outcome::Interrupted,
        };
        assert!(matches!(
            SyncEvent::from_record(&interrupted),
            SyncEvent::Skip {
                reason: SkipReason::Interrupted,
                ..
            }
        ));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.500s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
