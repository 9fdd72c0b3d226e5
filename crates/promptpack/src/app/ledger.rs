//! Append-only ledger of exact-text substitutions.
//!
//! Each record swaps one unique occurrence of `old_text` for `new_text` in a single file.
//! Records are never deleted; unapply and reapply swap the text back and forth and flip
//! the record's `applied` flag. The target file is always written before the ledger, and
//! restored if the ledger cannot be persisted, so both change together or not at all.
//! New text may not be empty: the record must be able to find its edit again to revert it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::domain::errors::PatchError;
use crate::domain::model::PatchRecord;
use crate::infra::fsutil::{FileLock, write_atomic};

/// Longest description accepted for a patch, in whitespace-separated words.
pub const MAX_DESCRIPTION_WORDS: usize = 10;

/// Line separating old and new text in patch input.
pub const PATCH_DELIMITER: &str = "=====";

/// Old/new text pair read from patch input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchInput {
    pub old_text: String,
    pub new_text: String,
}

impl PatchInput {
    /// Split `input` at the first line consisting solely of [`PATCH_DELIMITER`].
    ///
    /// The newline right before the delimiter and one trailing newline at the end of the
    /// input are not part of the texts.
    pub fn parse(input: &str) -> Result<Self, PatchError> {
        let mut offset = 0;
        for line in input.split_inclusive('\n') {
            let bare = line.trim_end_matches(['\n', '\r']);
            if bare == PATCH_DELIMITER {
                let old = strip_newline(&input[..offset]);
                let new = strip_newline(&input[offset + line.len()..]);
                return Ok(Self {
                    old_text: old.to_owned(),
                    new_text: new.to_owned(),
                });
            }
            offset += line.len();
        }
        Err(PatchError::MissingDelimiter(PATCH_DELIMITER))
    }
}

fn strip_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Ordered patch history persisted as a JSON array.
#[derive(Debug, Clone)]
pub struct PatchLedger {
    path: PathBuf,
    records: Vec<PatchRecord>,
}

impl PatchLedger {
    /// Load the ledger at `path`. A missing file is an empty history.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PatchError> {
        let path = path.into();
        let records = read_records(&path)?;
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    pub fn get(&self, id: u64) -> Option<&PatchRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Identifier the next applied patch will receive.
    pub fn next_id(&self) -> u64 {
        self.records.iter().map(|record| record.id).max().unwrap_or(0) + 1
    }

    /// Replace the single occurrence of `old_text` in `target` with `new_text` and record it.
    pub fn apply(
        &mut self,
        target: &Path,
        description: &str,
        old_text: &str,
        new_text: &str,
    ) -> Result<u64, PatchError> {
        if !target.is_file() {
            return Err(PatchError::MissingFile(target.to_path_buf()));
        }
        let target = fs::canonicalize(target).map_err(|source| PatchError::Io {
            path: target.to_path_buf(),
            source,
        })?;

        let words = description.split_whitespace().count();
        if words > MAX_DESCRIPTION_WORDS {
            return Err(PatchError::DescriptionTooLong {
                path: target,
                words,
                max: MAX_DESCRIPTION_WORDS,
            });
        }

        if !old_text.is_empty() && new_text.is_empty() {
            return Err(PatchError::EmptyReplacement(target));
        }

        let _lock = self.lock()?;
        self.records = read_records(&self.path)?;

        let original = read_target(&target)?;
        let updated = replace_unique(&target, &original, old_text, new_text)?;
        write_target(&target, &updated)?;

        let id = self.next_id();
        self.records.push(PatchRecord {
            id,
            timestamp: OffsetDateTime::now_utc(),
            filepath: target.clone(),
            description: description.split_whitespace().collect::<Vec<_>>().join(" "),
            old_text: old_text.to_owned(),
            new_text: new_text.to_owned(),
            applied: true,
        });

        if let Err(err) = self.persist() {
            self.records.pop();
            return Err(rollback(&target, &original, err));
        }

        tracing::info!(id, path = %target.display(), "patch applied");
        Ok(id)
    }

    /// Revert patch `id`: swap its new text back to the old text.
    pub fn unapply(&mut self, id: u64) -> Result<PatchRecord, PatchError> {
        self.transition(id, false)
    }

    /// Re-apply a previously unapplied patch `id`.
    pub fn reapply(&mut self, id: u64) -> Result<PatchRecord, PatchError> {
        self.transition(id, true)
    }

    fn transition(&mut self, id: u64, applied: bool) -> Result<PatchRecord, PatchError> {
        let _lock = self.lock()?;
        self.records = read_records(&self.path)?;

        let index = self
            .records
            .iter()
            .position(|record| record.id == id)
            .ok_or(PatchError::UnknownId(id))?;
        let record = self.records[index].clone();
        if record.applied == applied {
            return Err(if applied {
                PatchError::AlreadyApplied(id)
            } else {
                PatchError::NotApplied(id)
            });
        }

        let target = record.filepath.clone();
        if !target.is_file() {
            return Err(PatchError::MissingFile(target));
        }
        let from = record.expected_text();
        let to = if applied {
            &record.new_text
        } else {
            &record.old_text
        };

        let original = read_target(&target)?;
        let updated = replace_unique(&target, &original, from, to)?;
        write_target(&target, &updated)?;

        self.records[index].applied = applied;
        if let Err(err) = self.persist() {
            self.records[index].applied = record.applied;
            return Err(rollback(&target, &original, err));
        }

        tracing::info!(id, applied, path = %target.display(), "patch state changed");
        Ok(self.records[index].clone())
    }

    fn lock(&self) -> Result<FileLock, PatchError> {
        FileLock::acquire(&self.path).map_err(|source| PatchError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn persist(&self) -> Result<(), PatchError> {
        let data = serde_json::to_string_pretty(&self.records).map_err(|source| {
            PatchError::CorruptLedger {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, data.as_bytes()).map_err(|source| PatchError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn read_records(path: &Path) -> Result<Vec<PatchRecord>, PatchError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PatchError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&data).map_err(|source| PatchError::CorruptLedger {
        path: path.to_path_buf(),
        source,
    })
}

fn read_target(path: &Path) -> Result<String, PatchError> {
    fs::read_to_string(path).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_target(path: &Path, contents: &str) -> Result<(), PatchError> {
    write_atomic(path, contents.as_bytes()).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Put `original` back into `path` after the ledger could not be written. Returns `cause`,
/// or `RollbackFailed` when the file is left modified.
fn rollback(path: &Path, original: &str, cause: PatchError) -> PatchError {
    match write_atomic(path, original.as_bytes()) {
        Ok(()) => cause,
        Err(source) => {
            tracing::error!(path = %path.display(), error = %source, "failed to restore file after ledger error");
            PatchError::RollbackFailed {
                path: path.to_path_buf(),
                cause: Box::new(cause),
                source,
            }
        }
    }
}

/// Replace the sole occurrence of `from` in `contents`.
fn replace_unique(path: &Path, contents: &str, from: &str, to: &str) -> Result<String, PatchError> {
    if from.is_empty() {
        return Err(PatchError::EmptyMatch(path.to_path_buf()));
    }
    match contents.matches(from).count() {
        0 => Err(PatchError::NotFound(path.to_path_buf())),
        1 => Ok(contents.replacen(from, to, 1)),
        count => Err(PatchError::Ambiguous {
            path: path.to_path_buf(),
            count,
        }),
    }
}
