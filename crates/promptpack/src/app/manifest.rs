//! Persistent manifest of selected files, shared between projects.
//!
//! The manifest is a flat list of absolute paths. A store only owns the entries below its
//! project root; entries from other projects are carried through every write untouched
//! as long as the files they name still exist. Entries are stored canonicalized, except
//! when a symlink inside the project leads outside it; those keep their in-project spelling
//! so this store still owns them.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::app::filter::is_text_file;
use crate::domain::errors::ManifestError;
use crate::infra::fsutil::{FileLock, write_atomic};

/// Reads and writes the manifest file for one project root.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
    root: PathBuf,
}

impl ManifestStore {
    /// Create a store persisting to `path` on behalf of the project rooted at `root`.
    pub fn new(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            path: path.into(),
            root: fs::canonicalize(&root).unwrap_or(root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entries that belong to this project and still exist. Unreadable manifests yield an
    /// empty set.
    pub fn load(&self) -> BTreeSet<PathBuf> {
        match self.read_entries() {
            Ok(entries) => entries
                .into_iter()
                .filter(|path| self.contains(path) && path.exists())
                .collect(),
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %err, "cannot read manifest");
                }
                BTreeSet::new()
            }
        }
    }

    /// Replace this project's entries with `selection`, keeping other projects' entries.
    pub fn save(&self, selection: &[PathBuf]) -> Result<(), ManifestError> {
        let resolved: BTreeSet<PathBuf> = selection.iter().map(|path| self.normalize(path)).collect();
        self.update(|entries| *entries = resolved)?;
        Ok(())
    }

    /// Add explicit files to the manifest. Every path must be an existing text file inside
    /// the project root; on the first violation nothing is written.
    pub fn add(&self, paths: &[PathBuf]) -> Result<BTreeSet<PathBuf>, ManifestError> {
        let mut accepted = Vec::with_capacity(paths.len());
        for path in paths {
            accepted.push(self.validate(path)?);
        }
        self.update(|entries| entries.extend(accepted))
    }

    /// Drop files from this project's entries. Unknown paths are ignored.
    pub fn remove(&self, paths: &[PathBuf]) -> Result<BTreeSet<PathBuf>, ManifestError> {
        let targets: Vec<PathBuf> = paths
            .iter()
            .map(|path| self.normalize(&self.absolute(path)))
            .collect();
        self.update(|entries| entries.retain(|entry| !targets.contains(entry)))
    }

    /// Locked read-modify-write of this project's entries.
    fn update<F>(&self, apply: F) -> Result<BTreeSet<PathBuf>, ManifestError>
    where
        F: FnOnce(&mut BTreeSet<PathBuf>),
    {
        let _lock = FileLock::acquire(&self.path).map_err(|source| self.io_error(source))?;

        let existing = match self.read_entries() {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(self.io_error(err)),
        };

        let (inside, outside): (Vec<PathBuf>, Vec<PathBuf>) =
            existing.into_iter().partition(|path| self.contains(path));

        let mut entries: BTreeSet<PathBuf> =
            inside.into_iter().filter(|path| path.exists()).collect();
        apply(&mut entries);

        let mut all: BTreeSet<PathBuf> = outside.into_iter().filter(|path| path.exists()).collect();
        all.extend(entries.iter().cloned());

        let mut contents = String::new();
        for path in &all {
            contents.push_str(&path.to_string_lossy());
            contents.push('\n');
        }
        write_atomic(&self.path, contents.as_bytes()).map_err(|source| self.io_error(source))?;
        tracing::debug!(
            path = %self.path.display(),
            project = entries.len(),
            total = all.len(),
            "manifest saved"
        );
        Ok(entries)
    }

    /// Absolute, resolved entries from the manifest; relative lines are skipped.
    fn read_entries(&self) -> io::Result<Vec<PathBuf>> {
        let data = fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let path = Path::new(line);
            if !path.is_absolute() {
                tracing::debug!(entry = line, "skipping relative manifest entry");
                continue;
            }
            entries.push(self.normalize(path));
        }
        Ok(entries)
    }

    fn validate(&self, path: &Path) -> Result<PathBuf, ManifestError> {
        let absolute = self.absolute(path);
        if !absolute.exists() {
            return Err(ManifestError::MissingFile(absolute));
        }
        let resolved = resolve(&absolute);
        if !resolved.is_file() {
            return Err(ManifestError::NotAFile(resolved));
        }
        if !self.contains(&resolved) {
            return Err(ManifestError::OutsideProject {
                path: resolved,
                root: self.root.clone(),
            });
        }
        if !is_text_file(&resolved) {
            return Err(ManifestError::NotText(resolved));
        }
        Ok(resolved)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn normalize(&self, path: &Path) -> PathBuf {
        let resolved = resolve(path);
        if !self.contains(&resolved) && self.contains(path) {
            path.to_path_buf()
        } else {
            resolved
        }
    }

    fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    fn io_error(&self, source: io::Error) -> ManifestError {
        ManifestError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn resolve(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    use anyhow::Result;

    struct Fixture {
        _temp: tempfile::TempDir,
        base: PathBuf,
        manifest: PathBuf,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let temp = tempfile::tempdir()?;
            let base = fs::canonicalize(temp.path())?;
            for (rel, contents) in [
                ("proj/a.txt", "a"),
                ("proj/c.txt", "c"),
                ("proj/nested/d.txt", "d"),
                ("other/b.txt", "b"),
            ] {
                let path = base.join(rel);
                fs::create_dir_all(path.parent().unwrap())?;
                fs::write(path, contents)?;
            }
            let manifest = base.join("manifest");
            Ok(Self {
                _temp: temp,
                base,
                manifest,
            })
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.base.join(rel)
        }

        fn store(&self) -> ManifestStore {
            ManifestStore::new(&self.manifest, self.path("proj"))
        }

        fn lines(&self) -> Result<Vec<String>> {
            Ok(fs::read_to_string(&self.manifest)?
                .lines()
                .map(str::to_owned)
                .collect())
        }
    }

    #[test]
    fn save_preserves_entries_of_other_projects() -> Result<()> {
        let fx = Fixture::new()?;
        fs::write(
            &fx.manifest,
            format!(
                "{}\n{}\n",
                fx.path("proj/a.txt").display(),
                fx.path("other/b.txt").display()
            ),
        )?;

        fx.store()
            .save(&[fx.path("proj/a.txt"), fx.path("proj/c.txt")])?;

        let expected: Vec<String> = ["other/b.txt", "proj/a.txt", "proj/c.txt"]
            .iter()
            .map(|rel| fx.path(rel).display().to_string())
            .collect();
        assert_eq!(fx.lines()?, expected);
        Ok(())
    }

    #[test]
    fn save_then_load_round_trips_within_project() -> Result<()> {
        let fx = Fixture::new()?;
        fs::write(&fx.manifest, format!("{}\n", fx.path("other/b.txt").display()))?;
        let store = fx.store();

        let selection = vec![fx.path("proj/nested/d.txt"), fx.path("proj/c.txt")];
        store.save(&selection)?;

        let loaded = store.load();
        let expected: BTreeSet<PathBuf> = selection.into_iter().collect();
        assert_eq!(loaded, expected);
        Ok(())
    }

    #[test]
    fn save_replaces_previous_project_entries() -> Result<()> {
        let fx = Fixture::new()?;
        let store = fx.store();
        store.save(&[fx.path("proj/a.txt"), fx.path("proj/c.txt")])?;
        store.save(&[fx.path("proj/c.txt"), fx.path("proj/c.txt")])?;

        assert_eq!(fx.lines()?, vec![fx.path("proj/c.txt").display().to_string()]);
        Ok(())
    }

    #[test]
    fn load_skips_relative_missing_and_foreign_entries() -> Result<()> {
        let fx = Fixture::new()?;
        fs::write(
            &fx.manifest,
            format!(
                "relative/a.txt\n\n{}\n{}\n{}\n",
                fx.path("proj/gone.txt").display(),
                fx.path("other/b.txt").display(),
                fx.path("proj/a.txt").display()
            ),
        )?;

        let loaded = fx.store().load();
        assert_eq!(loaded.into_iter().collect::<Vec<_>>(), vec![fx.path("proj/a.txt")]);
        Ok(())
    }

    #[test]
    fn missing_manifest_loads_empty() -> Result<()> {
        let fx = Fixture::new()?;
        assert!(fx.store().load().is_empty());
        Ok(())
    }

    #[test]
    fn vanished_foreign_entries_are_pruned_on_save() -> Result<()> {
        let fx = Fixture::new()?;
        fs::write(
            &fx.manifest,
            format!(
                "{}\n{}\n",
                fx.path("other/b.txt").display(),
                fx.path("elsewhere/missing.txt").display()
            ),
        )?;

        fx.store().save(&[])?;
        assert_eq!(fx.lines()?, vec![fx.path("other/b.txt").display().to_string()]);
        Ok(())
    }

    #[test]
    fn add_validates_every_path_before_writing() -> Result<()> {
        let fx = Fixture::new()?;
        fs::write(fx.path("proj/blob.bin"), b"\0\0\0")?;
        let store = fx.store();

        let err = store
            .add(&[PathBuf::from("a.txt"), PathBuf::from("blob.bin")])
            .unwrap_err();
        assert!(matches!(err, ManifestError::NotText(_)));
        assert!(!fx.manifest.exists());

        let err = store.add(&[fx.path("other/b.txt")]).unwrap_err();
        assert!(matches!(err, ManifestError::OutsideProject { .. }));

        let err = store.add(&[PathBuf::from("nope.txt")]).unwrap_err();
        assert!(matches!(err, ManifestError::MissingFile(_)));

        let err = store.add(&[PathBuf::from("nested")]).unwrap_err();
        assert!(matches!(err, ManifestError::NotAFile(_)));

        let entries = store.add(&[PathBuf::from("a.txt"), PathBuf::from("nested/d.txt")])?;
        assert_eq!(entries.len(), 2);
        let entries = store.add(&[fx.path("proj/c.txt")])?;
        assert_eq!(entries.len(), 3);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn entries_behind_outward_symlinks_stay_owned_by_project() -> Result<()> {
        let fx = Fixture::new()?;
        std::os::unix::fs::symlink(fx.path("other"), fx.path("proj/linked"))?;
        let store = fx.store();
        let linked = fx.path("proj/linked/b.txt");

        store.save(&[linked.clone(), fx.path("proj/a.txt")])?;
        assert_eq!(
            fx.lines()?,
            vec![
                fx.path("proj/a.txt").display().to_string(),
                linked.display().to_string()
            ]
        );
        assert!(store.load().contains(&linked));

        store.save(&[fx.path("proj/a.txt")])?;
        assert_eq!(fx.lines()?, vec![fx.path("proj/a.txt").display().to_string()]);

        store.save(&[linked.clone()])?;
        let remaining = store.remove(&[PathBuf::from("linked/b.txt")])?;
        assert!(remaining.is_empty());
        assert!(fx.lines()?.is_empty());
        Ok(())
    }

    #[test]
    fn remove_drops_only_named_entries() -> Result<()> {
        let fx = Fixture::new()?;
        let store = fx.store();
        store.save(&[fx.path("proj/a.txt"), fx.path("proj/c.txt")])?;

        let remaining = store.remove(&[PathBuf::from("a.txt"), PathBuf::from("unknown.txt")])?;
        assert_eq!(
            remaining.into_iter().collect::<Vec<_>>(),
            vec![fx.path("proj/c.txt")]
        );
        Ok(())
    }
}
