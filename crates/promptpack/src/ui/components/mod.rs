//! Collection of reusable TUI components.

pub mod file_tree;
pub mod ledger_view;
