use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(
        "Source path does not exist or is not a directory: {path}\nMake sure the path exists and you have read permissions."
    )]
    SourceNotFound { path: PathBuf },

    #[error("Destination path does not exist or is not a directory: {path}\nCheck that the device is mounted.")]
    DestinationNotFound { path: PathBuf },

    #[error("Could not find a connected CircuitPython device.\nPlug the board in, wait for the CIRCUITPY drive to mount, or pass --destination.")]
    NoDestinationFound,

    #[error("Ignore rules in {path}: {message}")]
    IgnoreRule { path: PathBuf, message: String },

    #[error("Failed to {op} {path}\nCause: {source}")]
    FileOp {
        op: FileOpKind,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Interrupted; {remaining} planned action(s) were not applied")]
    Interrupted { remaining: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Which destination mutation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOpKind {
    Copy,
    Delete,
    CreateDir,
    RemoveDir,
}

impl std::fmt::Display for FileOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::CreateDir => "create directory",
            Self::RemoveDir => "remove directory",
        };
        f.write_str(verb)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
