use crate::error::SyncError;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the rule files picked up under the source tree
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// Rules from one `.gitignore`, scoped to the directory that holds it
#[derive(Debug)]
struct RuleFile {
    /// Directory containing the rule file (absolute)
    dir: PathBuf,
    /// Depth of `dir` below the source root (root = 0)
    depth: usize,
    rules: Gitignore,
}

/// Cascading gitignore matcher for a source tree
///
/// Every `.gitignore` under the root is compiled separately and applies to
/// its own directory and everything below it. Lookups walk the rule files
/// from the deepest applicable one outwards and stop at the first file that
/// has an opinion, so a nested `!pattern` can re-include something a parent
/// directory excluded. Within a single file the last matching line wins.
#[derive(Debug)]
pub struct IgnoreMatcher {
    root: PathBuf,
    /// Sorted deepest first
    rule_files: Vec<RuleFile>,
    enabled: bool,
}

impl IgnoreMatcher {
    /// Discover and compile every rule file under `root`
    ///
    /// Never fails: unreadable files and malformed lines are logged and
    /// skipped so a broken `.gitignore` cannot abort a deploy.
    pub fn build(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut rule_files = Vec::new();

        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden_dir(entry));

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping while looking for ignore files: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || entry.file_name() != IGNORE_FILE_NAME {
                continue;
            }

            let Some(dir) = entry.path().parent() else {
                continue;
            };

            if let Some(rules) = compile_rule_file(dir, entry.path()) {
                rule_files.push(RuleFile {
                    dir: dir.to_path_buf(),
                    depth: entry.depth().saturating_sub(1),
                    rules,
                });
            }
        }

        rule_files.sort_by(|a, b| b.depth.cmp(&a.depth));
        tracing::debug!(
            "Loaded {} ignore file(s) under {}",
            rule_files.len(),
            root.display()
        );

        Self {
            root,
            rule_files,
            enabled: true,
        }
    }

    /// A matcher that ignores nothing and never touches the filesystem
    pub fn disabled() -> Self {
        Self {
            root: PathBuf::new(),
            rule_files: Vec::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn rule_file_count(&self) -> usize {
        self.rule_files.len()
    }

    /// Check a slash-separated path relative to the source root
    ///
    /// A path inside an ignored directory is ignored too, whatever deeper
    /// rules say about the path itself.
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        if !self.enabled || self.rule_files.is_empty() {
            return false;
        }

        let relative_path = relative_path.trim_matches('/');
        if relative_path.is_empty() {
            return false;
        }

        let mut ancestor = String::new();
        let mut segments = relative_path.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                break;
            }
            if !ancestor.is_empty() {
                ancestor.push('/');
            }
            ancestor.push_str(segment);
            if self.decide(&ancestor, true) == Some(true) {
                return true;
            }
        }

        self.decide(relative_path, is_dir).unwrap_or(false)
    }

    /// `Some(true)` ignored, `Some(false)` explicitly re-included, `None` no rule matched
    fn decide(&self, relative_path: &str, is_dir: bool) -> Option<bool> {
        let path = self.root.join(relative_path);

        for rule_file in &self.rule_files {
            if path == rule_file.dir || !path.starts_with(&rule_file.dir) {
                continue;
            }
            match rule_file.rules.matched(&path, is_dir) {
                Match::Ignore(_) => return Some(true),
                Match::Whitelist(_) => return Some(false),
                Match::None => {}
            }
        }

        None
    }
}

fn is_hidden_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with('.')
}

fn compile_rule_file(dir: &Path, file: &Path) -> Option<Gitignore> {
    let contents = match std::fs::read_to_string(file) {
        Ok(contents) => contents,
        Err(e) => {
            let err = SyncError::IgnoreRule {
                path: file.to_path_buf(),
                message: format!("unreadable, treating as absent ({})", e),
            };
            tracing::warn!("{}", err);
            return None;
        }
    };

    let mut builder = GitignoreBuilder::new(dir);
    for (line_num, line) in contents.lines().enumerate() {
        if let Err(e) = builder.add_line(Some(file.to_path_buf()), line) {
            let err = SyncError::IgnoreRule {
                path: file.to_path_buf(),
                message: format!("skipping line {}: {}", line_num + 1, e),
            };
            tracing::warn!("{}", err);
        }
    }

    match builder.build() {
        Ok(rules) => Some(rules),
        Err(e) => {
            let err = SyncError::IgnoreRule {
                path: file.to_path_buf(),
                message: format!("could not compile rules, treating as absent ({})", e),
            };
            tracing::warn!("{}", err);
            None
        }
    }
}
