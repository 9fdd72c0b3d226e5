//! Application services: tree selection, manifest, patch ledger and bundle output.

pub mod bundle;
pub mod filter;
pub mod ledger;
pub mod manifest;
pub mod staging;
pub mod tokens;
pub mod tree;
