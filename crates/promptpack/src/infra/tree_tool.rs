//! External `tree` listing used for the bundle's project structure.

use std::path::Path;
use std::process::Command;

use crate::domain::errors::ToolError;

/// Produces a textual drawing of a directory tree.
pub trait TreeRenderer {
    fn render_tree(&self, root: &Path) -> Result<String, ToolError>;
}

/// Runs the `tree` executable inside the project root.
#[derive(Debug, Clone)]
pub struct ExternalTree {
    program: String,
}

impl ExternalTree {
    pub fn new() -> Self {
        Self {
            program: "tree".to_owned(),
        }
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ExternalTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeRenderer for ExternalTree {
    fn render_tree(&self, root: &Path) -> Result<String, ToolError> {
        let output = Command::new(&self.program)
            .current_dir(root)
            .output()
            .map_err(|err| {
                tracing::debug!(program = %self.program, error = %err, "tree tool did not start");
                ToolError::Unavailable(self.program.clone())
            })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.program.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_unavailable() {
        let tool = ExternalTree::with_program("promptpack-no-such-tree-binary");
        let err = tool.render_tree(Path::new(".")).unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(name) if name == "promptpack-no-such-tree-binary"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_reports_failure() {
        let tool = ExternalTree::with_program("false");
        assert!(matches!(
            tool.render_tree(Path::new(".")),
            Err(ToolError::Failed { .. })
        ));
    }
}
