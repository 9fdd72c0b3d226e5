//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::{config_dir, home_dir};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".promptpack/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub capacity: Capacity,
    #[serde(default)]
    pub bundle: Bundle,
}

/// Locations of every persisted artifact. Relative entries resolve against the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paths {
    #[serde(default = "Paths::default_manifest")]
    pub manifest: String,
    #[serde(default = "Paths::default_ledger")]
    pub ledger: String,
    #[serde(default = "Paths::default_staging")]
    pub staging: String,
    #[serde(default = "Paths::default_output")]
    pub output: String,
}

impl Paths {
    fn default_manifest() -> String {
        "~/.promptpack".into()
    }

    fn default_ledger() -> String {
        ".promptpack/patches.json".into()
    }

    fn default_staging() -> String {
        ".promptpack/staging.txt".into()
    }

    fn default_output() -> String {
        "code.txt".into()
    }

    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        resolve_path(&self.manifest, root)
    }

    pub fn ledger_path(&self, root: &Path) -> PathBuf {
        resolve_path(&self.ledger, root)
    }

    pub fn staging_path(&self, root: &Path) -> PathBuf {
        resolve_path(&self.staging, root)
    }

    pub fn output_path(&self, root: &Path) -> PathBuf {
        resolve_path(&self.output, root)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            manifest: Self::default_manifest(),
            ledger: Self::default_ledger(),
            staging: Self::default_staging(),
            output: Self::default_output(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default = "Scan::default_probe_bytes")]
    pub probe_bytes: usize,
    #[serde(default)]
    pub respect_gitignore: bool,
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Scan {
    fn default_probe_bytes() -> usize {
        8192
    }
}

impl Default for Scan {
    fn default() -> Self {
        Self {
            show_hidden: false,
            probe_bytes: Self::default_probe_bytes(),
            respect_gitignore: false,
            ignore: Vec::new(),
        }
    }
}

/// A named model context window used by the capacity report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimit {
    pub name: String,
    pub context_window: usize,
}

impl ModelLimit {
    pub fn new(name: impl Into<String>, context_window: usize) -> Self {
        Self {
            name: name.into(),
            context_window,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    #[serde(default = "Capacity::default_models")]
    pub models: Vec<ModelLimit>,
}

impl Capacity {
    fn default_models() -> Vec<ModelLimit> {
        vec![
            ModelLimit::new("DeepSeek", 128_000),
            ModelLimit::new("Grok", 128_000),
            ModelLimit::new("GPT-4", 32_768),
            ModelLimit::new("GPT-5", 128_000),
            ModelLimit::new("Claude", 200_000),
            ModelLimit::new("Qwen", 128_000),
        ]
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self {
            models: Self::default_models(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    use_external_tree: Option<bool>,
}

impl Bundle {
    pub fn use_external_tree(&self) -> bool {
        self.use_external_tree.unwrap_or(true)
    }
}

impl Default for Bundle {
    fn default() -> Self {
        Self {
            use_external_tree: Some(true),
        }
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    manifest: Option<String>,
    output: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            manifest: env::var("PROMPTPACK_MANIFEST").ok(),
            output: env::var("PROMPTPACK_OUTPUT").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(manifest: &str, output: &str) -> Self {
        Self {
            manifest: Some(manifest.to_owned()),
            output: Some(output.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load(root: &Path) -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH));
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            tracing::debug!(path = %global_path.display(), "loading global config");
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            tracing::debug!(path = %workspace_path.display(), "loading workspace config");
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            paths: merge_paths(self.paths, other.paths),
            scan: merge_scan(self.scan, other.scan),
            capacity: merge_capacity(self.capacity, other.capacity),
            bundle: merge_bundle(self.bundle, other.bundle),
        }
    }
}

fn merge_paths(base: Paths, overlay: Paths) -> Paths {
    Paths {
        manifest: choose(base.manifest, overlay.manifest, Paths::default_manifest),
        ledger: choose(base.ledger, overlay.ledger, Paths::default_ledger),
        staging: choose(base.staging, overlay.staging, Paths::default_staging),
        output: choose(base.output, overlay.output, Paths::default_output),
    }
}

fn merge_scan(base: Scan, overlay: Scan) -> Scan {
    let mut ignore = base.ignore;
    for pattern in overlay.ignore {
        if !ignore.contains(&pattern) {
            ignore.push(pattern);
        }
    }

    Scan {
        show_hidden: overlay.show_hidden || base.show_hidden,
        probe_bytes: if overlay.probe_bytes != Scan::default_probe_bytes() {
            overlay.probe_bytes
        } else {
            base.probe_bytes
        },
        respect_gitignore: overlay.respect_gitignore || base.respect_gitignore,
        ignore,
    }
}

fn merge_capacity(base: Capacity, overlay: Capacity) -> Capacity {
    if overlay.models != Capacity::default_models() {
        overlay
    } else {
        base
    }
}

fn merge_bundle(mut base: Bundle, overlay: Bundle) -> Bundle {
    if let Some(value) = overlay.use_external_tree {
        base.use_external_tree = Some(value);
    }
    base
}

fn choose(base: String, overlay: String, default_fn: fn() -> String) -> String {
    if overlay != default_fn() {
        overlay
    } else {
        base
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("promptpack/config.toml"))
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(manifest) = env.manifest {
        config.paths.manifest = manifest;
    }
    if let Some(output) = env.output {
        config.paths.output = output;
    }
    config
}

/// Expand `~/` and anchor relative paths at `root`.
fn resolve_path(raw: &str, root: &Path) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest);
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_uses_defaults_when_no_files() {
        let config = Config::load_with_layers(None, None, EnvOverrides::default())
            .expect("load default config");
        assert_eq!(config.paths.output, "code.txt");
        assert_eq!(config.scan.probe_bytes, 8192);
        assert_eq!(config.capacity.models.len(), 6);
        assert!(config.bundle.use_external_tree());
    }

    #[test]
    fn merge_global_and_workspace() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let global = temp.path().join("config.toml");
        fs::write(
            &global,
            r#"
[paths]
output = "bundle.txt"
[scan]
ignore = ["generated/"]
"#,
        )?;

        let workspace_dir = temp.path().join("repo");
        fs::create_dir_all(workspace_dir.join(".promptpack"))?;
        fs::write(
            workspace_dir.join(".promptpack/config.toml"),
            r#"
[scan]
ignore = ["*.cache"]
[bundle]
use_external_tree = false
"#,
        )?;

        let config = Config::load_with_layers(
            Some(global),
            Some(workspace_dir.join(".promptpack/config.toml")),
            EnvOverrides::default(),
        )?;

        assert_eq!(config.paths.output, "bundle.txt");
        assert_eq!(config.scan.ignore, vec!["generated/", "*.cache"]);
        assert!(!config.bundle.use_external_tree());
        Ok(())
    }

    #[test]
    fn env_overrides_take_precedence() -> Result<()> {
        let overrides = EnvOverrides::for_tests("/tmp/manifest", "out.txt");
        let config = Config::load_with_layers(None, None, overrides)?;
        assert_eq!(config.paths.manifest, "/tmp/manifest");
        assert_eq!(config.paths.output, "out.txt");
        Ok(())
    }

    #[test]
    fn capacity_table_is_replaced_wholesale() -> Result<()> {
        let config = Config::from_str(
            r#"
[[capacity.models]]
name = "Tiny"
context_window = 4096
"#,
        )?;
        let merged = Config::default().merge(config);
        assert_eq!(merged.capacity.models, vec![ModelLimit::new("Tiny", 4096)]);
        Ok(())
    }

    #[test]
    fn relative_paths_resolve_against_root() {
        let paths = Paths::default();
        let root = Path::new("/work/project");
        assert_eq!(
            paths.ledger_path(root),
            PathBuf::from("/work/project/.promptpack/patches.json")
        );
        assert_eq!(paths.output_path(root), PathBuf::from("/work/project/code.txt"));
        if let Some(home) = home_dir() {
            assert_eq!(paths.manifest_path(root), home.join(".promptpack"));
        }
    }

    #[test]
    fn invalid_config_returns_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let file = temp.path().join("broken.toml");
        fs::write(&file, "this is not toml")?;
        let result = Config::from_file(&file);
        assert!(result.is_err());
        Ok(())
    }
}
