//! Domain-specific errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while building the project tree. Always fatal for the invocation.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("cannot read project root {path}: {source}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("project root {0} is not a directory")]
    RootNotDirectory(PathBuf),
    #[error("invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Failures while reading or writing the selection manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("{0}: file not found")]
    MissingFile(PathBuf),
    #[error("{0}: not a regular file")]
    NotAFile(PathBuf),
    #[error("{0}: not a text file")]
    NotText(PathBuf),
    #[error("{path}: outside of project root {root}")]
    OutsideProject { path: PathBuf, root: PathBuf },
    #[error("failed to persist manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures raised by the patch ledger. Every variant that concerns a target file names it.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("{0}: file not found")]
    MissingFile(PathBuf),
    #[error("{path}: description has {words} words (max {max})")]
    DescriptionTooLong {
        path: PathBuf,
        words: usize,
        max: usize,
    },
    #[error("{0}: text to match is empty")]
    EmptyMatch(PathBuf),
    #[error("{0}: replacement text is empty, include surrounding text so the patch can be reverted")]
    EmptyReplacement(PathBuf),
    #[error("{0}: text not found")]
    NotFound(PathBuf),
    #[error("{path}: text appears {count} times")]
    Ambiguous { path: PathBuf, count: usize },
    #[error("no patch with id {0}")]
    UnknownId(u64),
    #[error("patch {0} is already applied")]
    AlreadyApplied(u64),
    #[error("patch {0} is not applied")]
    NotApplied(u64),
    #[error("patch input is missing the '{0}' delimiter line")]
    MissingDelimiter(&'static str),
    #[error("ledger {path} is corrupt: {source}")]
    CorruptLedger {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path} was changed but not recorded ({cause}); restoring it failed: {source}")]
    RollbackFailed {
        path: PathBuf,
        cause: Box<PatchError>,
        #[source]
        source: io::Error,
    },
}

/// Failures raised by the staging accumulator.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("{0}: file not found")]
    MissingFile(PathBuf),
    #[error("{0}: not a text file")]
    NotText(PathBuf),
    #[error("{path}: line range {start}-{end} is outside the file ({lines} lines)")]
    RangeOutOfBounds {
        path: PathBuf,
        start: usize,
        end: usize,
        lines: usize,
    },
    #[error("nothing staged")]
    Empty,
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// External collaborators (tree listing, clipboard) that could not do their job.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0} is unavailable")]
    Unavailable(String),
    #[error("{tool} failed: {message}")]
    Failed { tool: String, message: String },
}
