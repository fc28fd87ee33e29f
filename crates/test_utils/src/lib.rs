#![forbid(unsafe_code)]

//! # Vaultward Test Utilities
//!
//! Fixtures shared by the workspace's test suites. Tests run in parallel,
//! so every fixture owns an independent temporary state directory.

pub mod fixtures;
