//! HTTP witness clients.
//!
//! Two flavors share one implementation and differ only in URL prefixes:
//! a generic checkpoint endpoint, and a sibling instance of this system
//! acting as the third party.

use crate::error::AttestError;
use crate::witness::Witness;
use std::time::Duration;
use vaultward_types::witness::{WitnessCheckpoint, WitnessReceipt, WitnessVerification};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// URL layout of the remote witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFlavor {
    /// `POST /checkpoint`, `GET /checkpoint/{id}`, `GET /health`.
    Generic,
    /// A sibling instance: the same operations under `/api/v1/witness`.
    Sibling,
}

impl HttpFlavor {
    fn prefix(self) -> &'static str {
        match self {
            HttpFlavor::Generic => "",
            HttpFlavor::Sibling => "/api/v1/witness",
        }
    }
}

/// A witness reached over HTTP.
pub struct HttpWitness {
    name: String,
    base_url: String,
    flavor: HttpFlavor,
    client: reqwest::blocking::Client,
}

impl HttpWitness {
    /// Builds a client for `base_url` (no trailing slash) with the given
    /// flavor.
    pub fn new(name: &str, base_url: &str, flavor: HttpFlavor) -> Result<Self, AttestError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AttestError::Witness {
                name: name.to_string(),
                reason: format!("client build failed: {}", e),
            })?;
        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            flavor,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.flavor.prefix(), path)
    }

    fn failure(&self, reason: impl std::fmt::Display) -> AttestError {
        AttestError::Witness {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl Witness for HttpWitness {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, checkpoint: &WitnessCheckpoint) -> Result<WitnessReceipt, AttestError> {
        let response = self
            .client
            .post(self.url("/checkpoint"))
            .json(checkpoint)
            .send()
            .map_err(|e| self.failure(e))?;
        if !response.status().is_success() {
            return Err(self.failure(format!("http {}", response.status().as_u16())));
        }
        response.json().map_err(|e| self.failure(e))
    }

    fn verify(&self, checkpoint_id: &str) -> Result<WitnessVerification, AttestError> {
        let response = self
            .client
            .get(self.url(&format!("/checkpoint/{}", checkpoint_id)))
            .send()
            .map_err(|e| self.failure(e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(WitnessVerification {
                checkpoint_id: checkpoint_id.to_string(),
                known: false,
                received_at: 0,
            });
        }
        if !response.status().is_success() {
            return Err(self.failure(format!("http {}", response.status().as_u16())));
        }
        response.json().map_err(|e| self.failure(e))
    }

    fn ping(&self) -> Result<(), AttestError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .map_err(|e| self.failure(e))?;
        if !response.status().is_success() {
            return Err(self.failure(format!("http {}", response.status().as_u16())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavors_differ_only_in_prefix() {
        let generic = HttpWitness::new("g", "http://w.example:8080/", HttpFlavor::Generic).unwrap();
        let sibling = HttpWitness::new("s", "http://w.example:8080", HttpFlavor::Sibling).unwrap();
        assert_eq!(generic.url("/checkpoint"), "http://w.example:8080/checkpoint");
        assert_eq!(
            sibling.url("/checkpoint"),
            "http://w.example:8080/api/v1/witness/checkpoint"
        );
        assert_eq!(generic.url("/health"), "http://w.example:8080/health");
    }

    #[test]
    fn unreachable_witness_reports_name() {
        // Port 9 (discard) on loopback: the connection is refused fast,
        // never a hang past the client timeout.
        let witness =
            HttpWitness::new("offline", "http://127.0.0.1:9", HttpFlavor::Generic).unwrap();
        let err = witness.ping().unwrap_err();
        assert!(err.to_string().contains("offline"));
    }
}
