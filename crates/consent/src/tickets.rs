//! Deletion tickets: Owner-signed capabilities and Host-signed receipts.
//!
//! The Host may not delete anything without a registered, unexpired ticket
//! whose signed scope matches the target. Usage records are append-only
//! and survive the ticket that produced them.

use crate::error::TicketError;
use parking_lot::RwLock;
use std::path::PathBuf;
use vaultward_crypto::key_store::LocalIdentity;
use vaultward_crypto::{nonce, sign};
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::ticket::{Ticket, TicketTarget, TicketUsage};
use vaultward_types::time::unix_now;

/// Issues an Owner-signed ticket over `target`.
///
/// `ttl_secs` of zero produces a ticket that never expires.
pub fn issue_ticket(
    owner: &LocalIdentity,
    target: TicketTarget,
    reason: &str,
    ttl_secs: i64,
) -> Result<Ticket, TicketError> {
    let now = unix_now();
    let mut ticket = Ticket {
        id: nonce::random_id(),
        owner_key_id: owner.key_id.clone(),
        target,
        reason: reason.to_string(),
        created_at: now,
        expires_at: if ttl_secs == 0 { 0 } else { now + ttl_secs },
        owner_signature: String::new(),
    };
    let hash = ticket.signing_hash()?;
    ticket.owner_signature = owner.sign_hex(hash.as_bytes())?;
    Ok(ticket)
}

#[derive(Default)]
struct TicketState {
    tickets: Vec<Ticket>,
    usage: Vec<TicketUsage>,
}

/// The Host-side ticket registry and usage log.
pub struct TicketManager {
    tickets_path: PathBuf,
    usage_path: PathBuf,
    tickets_lock: FileLock,
    usage_lock: FileLock,
    host: LocalIdentity,
    owner_public_key_hex: String,
    inner: RwLock<TicketState>,
}

impl TicketManager {
    /// Opens the registry in `state`. The Owner public key pins which
    /// signatures are accepted at registration.
    pub fn open(
        state: &StateDir,
        host: LocalIdentity,
        owner_public_key_hex: &str,
    ) -> Result<Self, TicketError> {
        let tickets_path = state.file(dir::TICKETS_FILE);
        let usage_path = state.file(dir::TICKET_USAGE_FILE);
        let tickets: Vec<Ticket> = atomic::read_json_or_default(&tickets_path)?;
        let usage: Vec<TicketUsage> = atomic::read_json_or_default(&usage_path)?;
        Ok(Self {
            tickets_lock: FileLock::new(&tickets_path),
            usage_lock: FileLock::new(&usage_path),
            tickets_path,
            usage_path,
            host,
            owner_public_key_hex: owner_public_key_hex.to_string(),
            inner: RwLock::new(TicketState { tickets, usage }),
        })
    }

    /// Registers an Owner-signed ticket after verifying its signature and
    /// that it has not already expired.
    pub fn register_ticket(&self, ticket: Ticket) -> Result<(), TicketError> {
        let hash = ticket.signing_hash()?;
        if !sign::verify_hex(&self.owner_public_key_hex, hash.as_bytes(), &ticket.owner_signature)
        {
            return Err(TicketError::InvalidSignature(ticket.id));
        }
        if ticket.is_expired_at(unix_now()) {
            return Err(TicketError::Expired(ticket.id));
        }
        let mut inner = self.inner.write();
        if inner.tickets.iter().any(|t| t.id == ticket.id) {
            return Err(TicketError::DuplicateRegistration(ticket.id));
        }
        let mut tickets = inner.tickets.clone();
        tickets.push(ticket.clone());
        self.tickets_lock
            .with_lock(|| atomic::write_json(&self.tickets_path, &tickets))?;
        inner.tickets = tickets;
        tracing::info!(target: "tickets", id = %ticket.id, "ticket registered");
        Ok(())
    }

    /// Finds a registered, unexpired ticket authorizing the deletion of
    /// `path` / `snapshot_id`, returning its id.
    pub fn validate_delete(&self, path: &str, snapshot_id: &str) -> Result<String, TicketError> {
        let now = unix_now();
        let inner = self.inner.read();
        inner
            .tickets
            .iter()
            .find(|t| !t.is_expired_at(now) && t.matches(path, snapshot_id))
            .map(|t| t.id.clone())
            .ok_or_else(|| TicketError::NoAuthorizingTicket {
                path: path.to_string(),
                snapshot_id: snapshot_id.to_string(),
            })
    }

    /// Appends a Host-signed usage record for an exercised ticket.
    /// Records are never mutated afterwards.
    pub fn record_usage(
        &self,
        ticket_id: &str,
        deleted_paths: Vec<String>,
    ) -> Result<TicketUsage, TicketError> {
        let mut inner = self.inner.write();
        if !inner.tickets.iter().any(|t| t.id == ticket_id) {
            return Err(TicketError::UnknownTicket(ticket_id.to_string()));
        }
        let mut sorted_paths = deleted_paths;
        sorted_paths.sort();
        let mut usage = TicketUsage {
            ticket_id: ticket_id.to_string(),
            used_at: unix_now(),
            host_key_id: self.host.key_id.clone(),
            deleted_paths: sorted_paths,
            host_signature: String::new(),
        };
        let hash = usage.signing_hash()?;
        usage.host_signature = self.host.sign_hex(hash.as_bytes())?;

        let mut records = inner.usage.clone();
        records.push(usage.clone());
        self.usage_lock
            .with_lock(|| atomic::write_json(&self.usage_path, &records))?;
        inner.usage = records;
        tracing::info!(target: "tickets", id = ticket_id, "usage recorded");
        Ok(usage)
    }

    /// Drops expired tickets from the registry. Usage records for them
    /// remain. Returns how many tickets were removed.
    pub fn cleanup_expired(&self) -> Result<usize, TicketError> {
        let now = unix_now();
        let mut inner = self.inner.write();
        let retained: Vec<Ticket> = inner
            .tickets
            .iter()
            .filter(|t| !t.is_expired_at(now))
            .cloned()
            .collect();
        let removed = inner.tickets.len() - retained.len();
        if removed > 0 {
            self.tickets_lock
                .with_lock(|| atomic::write_json(&self.tickets_path, &retained))?;
            inner.tickets = retained;
        }
        Ok(removed)
    }

    /// A registered ticket by id.
    pub fn get(&self, ticket_id: &str) -> Option<Ticket> {
        self.inner
            .read()
            .tickets
            .iter()
            .find(|t| t.id == ticket_id)
            .cloned()
    }

    /// All registered tickets.
    pub fn list(&self) -> Vec<Ticket> {
        self.inner.read().tickets.clone()
    }

    /// Usage records, optionally filtered by ticket id.
    pub fn usage(&self, ticket_id: Option<&str>) -> Vec<TicketUsage> {
        self.inner
            .read()
            .usage
            .iter()
            .filter(|u| ticket_id.map_or(true, |id| u.ticket_id == id))
            .cloned()
            .collect()
    }
}
