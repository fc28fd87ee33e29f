#![forbid(unsafe_code)]

//! Structured logging bootstrap for collaborators embedding the core.

mod init;

pub use init::init_tracing;
