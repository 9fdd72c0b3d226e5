//! Domain models for the project tree and the patch ledger.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Index of a node inside a [`crate::app::tree::TreeModel`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// One filesystem entry in the project tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
    /// Non-owning back-reference; `None` only for the root.
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub expanded: bool,
    pub marked: bool,
    /// Files: size on disk. Directories: sum over descendant files.
    pub size: u64,
}

/// One exact-text substitution recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub id: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub filepath: PathBuf,
    pub description: String,
    pub old_text: String,
    pub new_text: String,
    pub applied: bool,
}

impl PatchRecord {
    /// Text currently expected in the file, given the `applied` flag.
    pub fn expected_text(&self) -> &str {
        if self.applied {
            &self.new_text
        } else {
            &self.old_text
        }
    }
}
