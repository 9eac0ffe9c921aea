//! Locating the CircuitPython drive to deploy to.
//!
//! The sync engine only ever sees a resolved destination path. How that path
//! is found is behind [`DestinationResolver`], so the engine does not depend
//! on any particular OS mount layout.

use std::fs;
use std::path::{Path, PathBuf};

/// File CircuitPython writes to the root of its drive on every boot
pub const BOOT_MARKER: &str = "boot_out.txt";

/// Volume label CircuitPython boards mount under by default
pub const DEFAULT_VOLUME_NAME: &str = "CIRCUITPY";

/// Supplies the destination root when none was given explicitly
pub trait DestinationResolver {
    fn resolve(&self) -> Option<PathBuf>;
}

impl<F> DestinationResolver for F
where
    F: Fn() -> Option<PathBuf>,
{
    fn resolve(&self) -> Option<PathBuf> {
        self()
    }
}

/// Finds a mounted volume that carries the boot marker
///
/// Volumes named `CIRCUITPY` are preferred over other volumes that happen to
/// carry a marker (e.g. a renamed drive).
pub struct MountedVolumeResolver {
    /// Directories whose children are mount points
    search_roots: Vec<PathBuf>,
    /// Paths that are mount points themselves
    volumes: Vec<PathBuf>,
}

impl MountedVolumeResolver {
    /// Mount locations for the current platform
    pub fn for_current_platform() -> Self {
        let mut search_roots = Vec::new();
        let mut volumes = Vec::new();

        if cfg!(target_os = "macos") {
            search_roots.push(PathBuf::from("/Volumes"));
        } else if cfg!(windows) {
            volumes.extend((b'D'..=b'Z').map(|letter| PathBuf::from(format!("{}:\\", letter as char))));
        } else {
            let user = whoami::username();
            search_roots.push(PathBuf::from("/media").join(&user));
            search_roots.push(PathBuf::from("/run/media").join(&user));
            search_roots.push(PathBuf::from("/media"));
            search_roots.push(PathBuf::from("/mnt"));
        }

        Self {
            volumes,
            ..Self::with_search_roots(search_roots)
        }
    }

    pub fn with_search_roots(search_roots: Vec<PathBuf>) -> Self {
        Self {
            search_roots,
            volumes: Vec::new(),
        }
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = self.volumes.clone();

        for root in &self.search_roots {
            let Ok(entries) = fs::read_dir(root) else {
                continue;
            };
            let mut children: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect();
            children.sort();
            candidates.extend(children);
        }

        candidates
    }
}

impl DestinationResolver for MountedVolumeResolver {
    fn resolve(&self) -> Option<PathBuf> {
        let devices: Vec<PathBuf> = self
            .candidates()
            .into_iter()
            .filter(|volume| volume.join(BOOT_MARKER).is_file())
            .collect();

        tracing::debug!("Found {} candidate device(s)", devices.len());

        devices
            .iter()
            .find(|volume| {
                volume
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with(DEFAULT_VOLUME_NAME))
            })
            .or_else(|| devices.first())
            .cloned()
    }
}

/// What a board says about itself in `boot_out.txt`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootInfo {
    pub version: String,
    pub board_id: Option<String>,
}

impl BootInfo {
    /// Read the marker from a device root, if there is one
    pub fn read(device_root: &Path) -> Option<Self> {
        let contents = fs::read_to_string(device_root.join(BOOT_MARKER)).ok()?;
        Self::parse(&contents)
    }

    /// Parse marker text such as
    ///
    /// ```text
    /// Adafruit CircuitPython 8.2.0 on 2023-07-05; Adafruit QT Py RP2040 with rp2040
    /// Board ID:adafruit_qtpy_rp2040
    /// ```
    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines();

        let banner = lines.next()?.split(';').next()?;
        let words: Vec<&str> = banner.split_whitespace().collect();
        let version = match words.iter().position(|w| *w == "on") {
            Some(on) if on > 0 => words[on - 1],
            _ => *words.get(words.len().checked_sub(3)?)?,
        };

        let board_id = lines
            .find_map(|line| line.strip_prefix("Board ID:"))
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Some(Self {
            version: version.to_string(),
            board_id,
        })
    }
}
