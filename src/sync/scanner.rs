use crate::filter::IgnoreMatcher;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extensions that are ever copied to or deleted from a device
pub const PYTHON_EXTENSIONS: &[&str] = &["py", "pyc"];

/// A regular file found under a scan root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileEntry {
    /// Slash-separated path relative to the scan root; the entry's identity
    pub relative_path: String,
}

pub struct Scanner<'m> {
    root: PathBuf,
    extensions: &'static [&'static str],
    matcher: Option<&'m IgnoreMatcher>,
    follow_links: bool,
}

impl<'m> Scanner<'m> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: PYTHON_EXTENSIONS,
            matcher: None,
            follow_links: false,
        }
    }

    /// Descend into symlinked directories (source side only)
    ///
    /// Off by default: a destination scan must only ever see paths that
    /// physically live under the destination root.
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn with_extensions(mut self, extensions: &'static [&'static str]) -> Self {
        self.extensions = extensions;
        self
    }

    /// Prune ignored directories and skip ignored files (source side only)
    pub fn with_matcher(mut self, matcher: &'m IgnoreMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Start a fresh traversal
    ///
    /// Nothing is read until the returned iterator is polled, and each call
    /// walks the tree again from the top.
    pub fn scan(&self) -> Scan<'_> {
        let root = self.root.clone();
        let matcher = self.matcher;

        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| keep_entry(&root, entry, matcher));

        Scan {
            root: &self.root,
            extensions: self.extensions,
            matcher: self.matcher,
            inner: Box::new(walker),
        }
    }
}

/// Lazy sequence of eligible files under a root
pub struct Scan<'a> {
    root: &'a Path,
    extensions: &'static [&'static str],
    matcher: Option<&'a IgnoreMatcher>,
    inner: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + 'a>,
}

impl Iterator for Scan<'_> {
    type Item = FileEntry;

    fn next(&mut self) -> Option<FileEntry> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    if let Some(ancestor) = e.loop_ancestor() {
                        tracing::warn!(
                            "Skipping symlink cycle at {} (points back to {})",
                            e.path().map(|p| p.display().to_string()).unwrap_or_default(),
                            ancestor.display()
                        );
                    } else {
                        tracing::warn!("Skipping unreadable entry: {}", e);
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() || !has_extension(entry.path(), self.extensions) {
                continue;
            }

            let Some(relative_path) = relative_path(self.root, entry.path()) else {
                tracing::warn!("Skipping non UTF-8 path: {}", entry.path().display());
                continue;
            };

            if let Some(matcher) = self.matcher {
                if matcher.is_ignored(&relative_path, false) {
                    tracing::trace!("Ignored: {}", relative_path);
                    continue;
                }
            }

            return Some(FileEntry { relative_path });
        }
    }
}

fn keep_entry(root: &Path, entry: &DirEntry, matcher: Option<&IgnoreMatcher>) -> bool {
    if entry.depth() == 0 {
        return true;
    }

    if entry.file_name().to_string_lossy().starts_with('.') {
        return false;
    }

    match matcher {
        Some(matcher) if entry.file_type().is_dir() => match relative_path(root, entry.path()) {
            Some(relative) => {
                let ignored = matcher.is_ignored(&relative, true);
                if ignored {
                    tracing::trace!("Pruned ignored directory: {}", relative);
                }
                !ignored
            }
            None => true,
        },
        _ => true,
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
}

/// `a/b/c.py` style path of `path` below `root`
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in relative.components() {
        let segment = component.as_os_str().to_str()?;
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(segment);
    }
    Some(out)
}
