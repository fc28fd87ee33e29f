#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Vaultward Types
//!
//! This crate is the foundational library for the Vaultward control plane,
//! containing all core data structures and the canonical-hash contract that
//! every cross-party signature covers.
//!
//! ## Architectural Role
//!
//! As the base crate, `vaultward-types` has minimal dependencies and is itself
//! a dependency for almost every other crate in the workspace. This structure
//! prevents circular dependencies and provides a stable, canonical definition
//! for shared types like `RestoreRequest`, `Policy`, `AuditEntry`, and
//! `Ticket`, and for the signing views whose byte layout both principals must
//! reproduce exactly.

/// A top-level, crate-wide `Result` type alias with a default error type.
pub type Result<T, E = crate::error::CodecError> = std::result::Result<T, E>;

/// Audit-chain entries and chain verification reports.
pub mod audit;
/// The canonical serialization-and-hash contract covered by all signatures.
pub mod canonical;
/// Per-file retrievability challenges and block-level PoR structures.
pub mod challenge;
/// Restore and deletion consent requests with their approval records.
pub mod consent;
/// A unified set of shared error machinery (`ErrorCode`, `CodecError`).
pub mod error;
/// Heartbeats and the dead-man switch state.
pub mod heartbeat;
/// Key-holder identities and the injected lookup capability.
pub mod identity;
/// The signed snapshot manifest and its entries.
pub mod manifest;
/// The jointly signed Owner/Host policy contract.
pub mod policy;
/// Owner-signed deletion capabilities and Host-countersigned usage records.
pub mod ticket;
/// Wall-clock helpers; all contract timestamps are integer Unix seconds.
pub mod time;
/// Witness checkpoints, receipts, and fan-out outcomes.
pub mod witness;
