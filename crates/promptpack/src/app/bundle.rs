//! Bundle generation: instructions, project structure and selected file contents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};

use crate::app::ledger::{MAX_DESCRIPTION_WORDS, PATCH_DELIMITER};
use crate::app::tree::TreeModel;
use crate::infra::fsutil::write_atomic;
use crate::infra::tree_tool::{ExternalTree, TreeRenderer};

const PREAMBLE_TEMPLATE: &str = r#"The following instructions apply to future code unless otherwise requested:
Analyze the attached text document with collected source code which is only a compilation, not a target file.
Interpretation of target file should be done via headers in the form ### ./relative/path.

If a file exists in the project structure below but is not included in this document, and you need to see it to complete the task, ask for that file before proceeding.

Return shell commands that make exact text replacements with promptpack.
For each change, emit one command. The old text must appear exactly once in the file:
```bash
promptpack patch relative/path "description of at most {{ max_words }} words" <<'EOF'
exact old text
{{ delimiter }}
exact new text
EOF
```

If it's a new file to the project, create it with format:
```bash
cat <<'EOF' > relative/path
NEW_FILE_CONTENT
EOF
```

If errors occur and we need to troubleshoot, ask for line ranges:
```bash
promptpack stage relative/path --lines 1-20
promptpack flush
```

Format for directory creation:
```bash
mkdir -p relative/path/to/folder
```

For removal (soft-delete):
```bash
mv relative/path relative/path_deleted
```

Important:
- Old and new text are separated by a line containing only {{ delimiter }}
- Preserve all indentation and whitespace exactly
- No explanations, only commands
- All commands in one code block
- Old text must match the file EXACTLY (including all spaces and newlines)
- New text must not be empty; to delete code, include a neighbouring line in both texts

## Project Structure
{{ tree }}
"#;

/// Outcome of writing a bundle.
#[derive(Debug, Clone)]
pub struct BundleReport {
    pub path: PathBuf,
    pub files: usize,
    pub bytes: u64,
    pub rendered: String,
}

/// Serializes a tree snapshot and selected files into the bundle artifact.
pub struct BundleWriter {
    env: Environment<'static>,
    output: PathBuf,
    renderer: Option<Box<dyn TreeRenderer>>,
}

impl BundleWriter {
    /// Writer targeting `output`, drawing the structure with the `tree` executable when
    /// it is available.
    pub fn new(output: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            env: default_environment()?,
            output: output.into(),
            renderer: Some(Box::new(ExternalTree::new())),
        })
    }

    /// Replace the external renderer; `None` always uses the built-in drawing.
    pub fn with_renderer(mut self, renderer: Option<Box<dyn TreeRenderer>>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Render the bundle text for `files` without touching the filesystem.
    pub fn render(&self, tree: &TreeModel, files: &[PathBuf]) -> Result<String> {
        let structure = self.structure(tree);
        let template = self
            .env
            .get_template("bundle")
            .map_err(|err| anyhow!("bundle template missing: {err}"))?;
        let mut rendered = template
            .render(context! {
                tree => structure,
                delimiter => PATCH_DELIMITER,
                max_words => MAX_DESCRIPTION_WORDS,
            })
            .map_err(|err| anyhow!("failed to render bundle preamble: {err}"))?;

        let mut sorted: Vec<&PathBuf> = files.iter().collect();
        sorted.sort();
        for path in sorted {
            let rel = path.strip_prefix(tree.root_path()).unwrap_or(path);
            rendered.push_str(&format!("\n### ./{}\n\n", rel.display()));
            match fs::read_to_string(path) {
                Ok(contents) => rendered.push_str(&contents),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "cannot read selected file");
                    rendered.push_str(&format!("# Error reading file: {err}\n"));
                }
            }
        }
        Ok(rendered)
    }

    /// Render and atomically write the bundle.
    pub fn write(&self, tree: &TreeModel, files: &[PathBuf]) -> Result<BundleReport> {
        let rendered = self.render(tree, files)?;
        write_atomic(&self.output, rendered.as_bytes())
            .with_context(|| format!("failed to write bundle to {}", self.output.display()))?;
        tracing::debug!(path = %self.output.display(), files = files.len(), "bundle written");
        Ok(BundleReport {
            path: self.output.clone(),
            files: files.len(),
            bytes: rendered.len() as u64,
            rendered,
        })
    }

    fn structure(&self, tree: &TreeModel) -> String {
        let external = self.renderer.as_ref().and_then(|renderer| {
            match renderer.render_tree(tree.root_path()) {
                Ok(text) if !text.trim().is_empty() => Some(text),
                Ok(_) => None,
                Err(err) => {
                    tracing::debug!(error = %err, "falling back to built-in tree drawing");
                    None
                }
            }
        });
        let mut text = external.unwrap_or_else(|| tree.render_ascii());
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }
}

fn default_environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env.add_template("bundle", PREAMBLE_TEMPLATE)
        .map_err(|err| anyhow!("failed to register bundle template: {err}"))?;
    Ok(env)
}
