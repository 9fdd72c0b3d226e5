//! Staging file that accumulates file excerpts until they are flushed to the clipboard.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::app::filter::is_text_file;
use crate::domain::errors::StagingError;
use crate::infra::clipboard::Clipboard;

#[derive(Debug, Clone)]
pub struct Staging {
    path: PathBuf,
}

impl Staging {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the whole of `file` under a `### ./rel` header. Returns the bytes appended.
    pub fn stage_file(&self, file: &Path, root: &Path) -> Result<usize, StagingError> {
        let contents = read_text(file)?;
        let mut chunk = format!("\n### ./{}\n\n", relative(file, root).display());
        chunk.push_str(&contents);
        if !contents.ends_with('\n') {
            chunk.push('\n');
        }
        self.append(&chunk)
    }

    /// Append the 1-based inclusive line range `start..=end` of `file`.
    ///
    /// Reversed bounds are swapped and zero is treated as the first line. The end is clamped
    /// to the file length; a start beyond the last line is an error.
    pub fn stage_lines(
        &self,
        file: &Path,
        root: &Path,
        start: usize,
        end: usize,
    ) -> Result<usize, StagingError> {
        let contents = read_text(file)?;
        let (start, end) = normalize_range((start, end));
        let lines: Vec<&str> = contents.lines().collect();
        if start > lines.len() {
            return Err(StagingError::RangeOutOfBounds {
                path: file.to_path_buf(),
                start,
                end,
                lines: lines.len(),
            });
        }
        let end = end.min(lines.len());

        let mut chunk = format!(
            "\n### ./{} (lines {start}-{end})\n\n",
            relative(file, root).display()
        );
        for line in &lines[start - 1..end] {
            chunk.push_str(line);
            chunk.push('\n');
        }
        self.append(&chunk)
    }

    /// Copy everything staged to `clipboard`, then delete the staging file.
    ///
    /// The file is kept when the copy fails so nothing staged is lost.
    pub fn flush(&self, clipboard: &mut dyn Clipboard) -> Result<usize, StagingError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(StagingError::Empty),
            Err(source) => return Err(self.io_error(source)),
        };
        if contents.trim().is_empty() {
            return Err(StagingError::Empty);
        }

        clipboard.copy(&contents)?;
        fs::remove_file(&self.path).map_err(|source| self.io_error(source))?;
        tracing::debug!(path = %self.path.display(), bytes = contents.len(), "staging flushed");
        Ok(contents.len())
    }

    fn append(&self, chunk: &str) -> Result<usize, StagingError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        file.write_all(chunk.as_bytes())
            .map_err(|source| self.io_error(source))?;
        Ok(chunk.len())
    }

    fn io_error(&self, source: io::Error) -> StagingError {
        StagingError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn read_text(file: &Path) -> Result<String, StagingError> {
    if !file.is_file() {
        return Err(StagingError::MissingFile(file.to_path_buf()));
    }
    if !is_text_file(file) {
        return Err(StagingError::NotText(file.to_path_buf()));
    }
    fs::read_to_string(file).map_err(|source| match source.kind() {
        io::ErrorKind::InvalidData => StagingError::NotText(file.to_path_buf()),
        _ => StagingError::Io {
            path: file.to_path_buf(),
            source,
        },
    })
}

fn relative<'a>(file: &'a Path, root: &Path) -> &'a Path {
    file.strip_prefix(root).unwrap_or(file)
}

fn normalize_range(range: (usize, usize)) -> (usize, usize) {
    let start = range.0.min(range.1).max(1);
    let end = range.0.max(range.1).max(1);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;

    use crate::infra::clipboard::MemoryClipboard;

    fn setup() -> Result<(tempfile::TempDir, Staging)> {
        let temp = tempfile::tempdir()?;
        fs::create_dir_all(temp.path().join("src"))?;
        fs::write(temp.path().join("src/lib.rs"), "one\ntwo\nthree\nfour")?;
        let staging = Staging::new(temp.path().join(".promptpack/staging.txt"));
        Ok((temp, staging))
    }

    #[test]
    fn stages_files_and_ranges_in_order() -> Result<()> {
        let (temp, staging) = setup()?;
        let file = temp.path().join("src/lib.rs");

        staging.stage_file(&file, temp.path())?;
        staging.stage_lines(&file, temp.path(), 3, 2)?;

        let staged = fs::read_to_string(staging.path())?;
        assert_eq!(
            staged,
            "\n### ./src/lib.rs\n\none\ntwo\nthree\nfour\n\n### ./src/lib.rs (lines 2-3)\n\ntwo\nthree\n"
        );
        Ok(())
    }

    #[test]
    fn clamps_end_and_rejects_start_past_eof() -> Result<()> {
        let (temp, staging) = setup()?;
        let file = temp.path().join("src/lib.rs");

        staging.stage_lines(&file, temp.path(), 0, 99)?;
        assert!(fs::read_to_string(staging.path())?.contains("(lines 1-4)"));

        let err = staging.stage_lines(&file, temp.path(), 5, 8).unwrap_err();
        assert!(matches!(err, StagingError::RangeOutOfBounds { lines: 4, .. }));
        Ok(())
    }

    #[test]
    fn rejects_missing_and_binary_files() -> Result<()> {
        let (temp, staging) = setup()?;
        fs::write(temp.path().join("blob.bin"), b"\0\x01")?;

        assert!(matches!(
            staging.stage_file(&temp.path().join("nope.rs"), temp.path()),
            Err(StagingError::MissingFile(_))
        ));
        assert!(matches!(
            staging.stage_file(&temp.path().join("blob.bin"), temp.path()),
            Err(StagingError::NotText(_))
        ));
        assert!(!staging.path().exists());
        Ok(())
    }

    #[test]
    fn flush_copies_then_deletes() -> Result<()> {
        let (temp, staging) = setup()?;
        let mut clipboard = MemoryClipboard::default();
        assert!(matches!(staging.flush(&mut clipboard), Err(StagingError::Empty)));

        staging.stage_file(&temp.path().join("src/lib.rs"), temp.path())?;
        let copied = staging.flush(&mut clipboard)?;
        assert!(copied > 0);
        assert!(clipboard.contents.is_some_and(|text| text.contains("### ./src/lib.rs")));
        assert!(!staging.path().exists());
        Ok(())
    }

    #[test]
    fn failed_copy_keeps_staged_content() -> Result<()> {
        let (temp, staging) = setup()?;
        staging.stage_file(&temp.path().join("src/lib.rs"), temp.path())?;

        let mut clipboard = MemoryClipboard {
            fail: true,
            ..MemoryClipboard::default()
        };
        assert!(matches!(staging.flush(&mut clipboard), Err(StagingError::Tool(_))));
        assert!(staging.path().exists());
        Ok(())
    }
}
