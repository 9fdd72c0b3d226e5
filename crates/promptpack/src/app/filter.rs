//! Eligibility rules for entries shown in the project tree.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::domain::errors::TreeError;
use crate::infra::config::Scan;

const PROMPTPACK_IGNORE: &str = ".promptpackignore";

/// Decides whether a filesystem entry may appear in the tree.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    show_hidden: bool,
    probe_bytes: usize,
    respect_gitignore: bool,
    globs: GlobSet,
}

impl PathFilter {
    /// Filter with the built-in rules only: hidden names and binary files are excluded.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: canonical_root(root.into()),
            show_hidden: false,
            probe_bytes: 8192,
            respect_gitignore: false,
            globs: GlobSet::empty(),
        }
    }

    /// Filter honoring the `[scan]` configuration and the project's `.promptpackignore`.
    pub fn from_config(root: impl Into<PathBuf>, scan: &Scan) -> Result<Self, TreeError> {
        let root = canonical_root(root.into());
        let mut builder = GlobSetBuilder::new();

        let mut patterns = scan.ignore.clone();
        patterns.extend(load_ignore_file(&root));

        for pattern in &patterns {
            for expanded in expand_dir_pattern(pattern) {
                let glob = Glob::new(&expanded).map_err(|err| TreeError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: err.to_string(),
                })?;
                builder.add(glob);
            }
        }

        let globs = builder.build().map_err(|err| TreeError::InvalidPattern {
            pattern: patterns.join(", "),
            message: err.to_string(),
        })?;

        Ok(Self {
            root,
            show_hidden: scan.show_hidden,
            probe_bytes: scan.probe_bytes.max(1),
            respect_gitignore: scan.respect_gitignore,
            globs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `.gitignore` rules should prune the walk as well.
    pub fn respect_gitignore(&self) -> bool {
        self.respect_gitignore
    }

    /// Whether `path` should be admitted into the tree.
    pub fn admits(&self, path: &Path, is_dir: bool) -> bool {
        if path == self.root {
            return true;
        }

        if !self.show_hidden && is_hidden(path) {
            return false;
        }

        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        if self.globs.is_match(rel) {
            return false;
        }

        is_dir || self.is_text_file(path)
    }

    /// Probe the leading bytes of `path`; a NUL byte marks the file as binary.
    pub fn is_text_file(&self, path: &Path) -> bool {
        is_text_file_with_probe(path, self.probe_bytes)
    }
}

/// Text check with the default probe size.
pub fn is_text_file(path: &Path) -> bool {
    is_text_file_with_probe(path, 8192)
}

fn is_text_file_with_probe(path: &Path, probe_bytes: usize) -> bool {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "cannot probe file");
            return false;
        }
    };
    let mut buf = Vec::with_capacity(probe_bytes);
    match file.take(probe_bytes as u64).read_to_end(&mut buf) {
        Ok(_) => !buf.contains(&0),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "cannot probe file");
            false
        }
    }
}

fn canonical_root(root: PathBuf) -> PathBuf {
    fs::canonicalize(&root).unwrap_or(root)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn expand_dir_pattern(raw: &str) -> Vec<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    vec![
        trimmed.to_owned(),
        format!("{trimmed}/**"),
        format!("**/{trimmed}"),
        format!("**/{trimmed}/**"),
    ]
}

fn load_ignore_file(root: &Path) -> Vec<String> {
    let path = root.join(PROMPTPACK_IGNORE);
    let file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(_) => return Vec::new(),
    };

    BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;

    #[test]
    fn rejects_hidden_and_binary_entries() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        fs::write(root.join(".env"), "SECRET=1")?;
        fs::write(root.join("blob.bin"), b"abc\0def")?;
        fs::write(root.join("notes.md"), "hello")?;
        fs::write(root.join("empty.txt"), "")?;

        let filter = PathFilter::new(root);
        assert!(!filter.admits(&root.join(".env"), false));
        assert!(!filter.admits(&root.join("blob.bin"), false));
        assert!(filter.admits(&root.join("notes.md"), false));
        assert!(filter.admits(&root.join("empty.txt"), false));
        assert!(!filter.admits(&root.join(".git"), true));
        Ok(())
    }

    #[test]
    fn probe_only_reads_leading_bytes() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("late-nul.txt");
        let mut contents = vec![b'a'; 64];
        contents.push(0);
        fs::write(&path, &contents)?;

        let scan = Scan {
            probe_bytes: 32,
            ..Scan::default()
        };
        let filter = PathFilter::from_config(temp.path(), &scan)?;
        assert!(filter.is_text_file(&path));
        assert!(!is_text_file(&path));
        Ok(())
    }

    #[test]
    fn honors_config_globs_and_ignore_file() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = temp.path();
        fs::create_dir_all(root.join("generated"))?;
        fs::write(root.join("generated/out.txt"), "x")?;
        fs::write(root.join("Cargo.lock"), "lock")?;
        fs::write(root.join(PROMPTPACK_IGNORE), "# comment\ngenerated/\n")?;

        let scan = Scan {
            ignore: vec!["*.lock".into()],
            ..Scan::default()
        };
        let filter = PathFilter::from_config(root, &scan)?;
        assert!(!filter.admits(&root.join("generated"), true));
        assert!(!filter.admits(&root.join("generated/out.txt"), false));
        assert!(!filter.admits(&root.join("Cargo.lock"), false));
        Ok(())
    }

    #[test]
    fn show_hidden_admits_dotfiles() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::write(temp.path().join(".rc"), "set x")?;
        let scan = Scan {
            show_hidden: true,
            ..Scan::default()
        };
        let filter = PathFilter::from_config(temp.path(), &scan)?;
        assert!(filter.admits(&temp.path().join(".rc"), false));
        Ok(())
    }
}
