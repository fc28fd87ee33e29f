#![forbid(unsafe_code)]

//! # Vaultward Attest
//!
//! Liveness and attestation: per-file retrievability challenges, block-level
//! PoR with fresh nonces, the Host heartbeat chain, the dead-man switch, and
//! checkpoint fan-out to independent external witnesses.

pub mod challenge;
pub mod deadman;
pub mod error;
pub mod heartbeat;
pub mod por;
pub mod witness;

pub use challenge::ChallengeManager;
pub use deadman::DeadManMonitor;
pub use error::AttestError;
pub use heartbeat::HeartbeatManager;
pub use por::PorManager;
pub use witness::{HttpFlavor, HttpWitness, Witness, WitnessManager};
