//! Infrastructure adapters for configuration, filesystem and external tools.

pub mod clipboard;
pub mod config;
pub mod fsutil;
pub mod logging;
pub mod tree_tool;
