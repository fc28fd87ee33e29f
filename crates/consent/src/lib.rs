#![forbid(unsafe_code)]

//! # Vaultward Consent
//!
//! The multi-party consent engine gating restores and deletions, and the
//! Owner-signed ticket capabilities a satisfied deletion intent produces.
//! Key-holder lookups arrive as an injected capability; this crate never
//! owns the policy lifecycle.

pub mod engine;
pub mod error;
pub mod tickets;

pub use engine::ConsentManager;
pub use error::{ConsentError, TicketError};
pub use tickets::{issue_ticket, TicketManager};
