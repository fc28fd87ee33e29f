#![forbid(unsafe_code)]

//! # Vaultward Storage
//!
//! The persistence substrate shared by every manager: an advisory
//! file-scoped lock bracketing read-modify-write spans, atomic
//! write-temp-then-rename JSON documents, and the state-directory layout.
//! Managers own their documents exclusively; this crate only makes the
//! ownership durable.

pub mod atomic;
pub mod dir;
pub mod error;
pub mod lock;

pub use dir::StateDir;
pub use error::StorageError;
pub use lock::FileLock;
