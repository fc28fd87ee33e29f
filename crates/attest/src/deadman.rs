//! The dead-man switch.
//!
//! Evaluated on demand rather than by a timer: given the expected check-in
//! interval `I`, the number of whole intervals missed is
//! `k = ⌊(now − last_check_in − grace) / I⌋`, mapped to a status by the
//! configured thresholds. The transition into `dead` mints a 128-bit
//! recovery code; only presenting that exact code clears the switch.
//! Alert callbacks fire on status transitions, never on steady-state
//! checks.

use crate::error::AttestError;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use vaultward_crypto::nonce;
use vaultward_storage::{atomic, dir, FileLock, StateDir};
use vaultward_types::heartbeat::{DeadManConfig, DeadManStatus, DeadManSwitch};
use vaultward_types::time::unix_now;

type TransitionCallback = Box<dyn Fn(DeadManStatus, DeadManStatus) + Send + Sync>;

/// Owns the persisted dead-man switch state.
pub struct DeadManMonitor {
    path: PathBuf,
    lock: FileLock,
    config: DeadManConfig,
    callbacks: Mutex<Vec<TransitionCallback>>,
    inner: RwLock<DeadManSwitch>,
}

impl DeadManMonitor {
    /// Opens the switch in `state`, initializing a healthy one checked in
    /// at the current instant when no state is persisted yet.
    pub fn open(state: &StateDir, config: DeadManConfig) -> Result<Self, AttestError> {
        let path = state.file(dir::DEADMAN_FILE);
        let switch = if path.exists() {
            atomic::read_json(&path)?
        } else {
            DeadManSwitch {
                enabled: true,
                last_check_in: unix_now(),
                expected_interval: config.expected_interval_secs,
                grace_period: config.grace_period_secs,
                status: DeadManStatus::Healthy,
                missed_count: 0,
                triggered_at: 0,
                recovery_code: String::new(),
            }
        };
        Ok(Self {
            lock: FileLock::new(&path),
            path,
            config,
            callbacks: Mutex::new(Vec::new()),
            inner: RwLock::new(switch),
        })
    }

    /// Registers a callback fired on every status transition with
    /// `(from, to)`.
    pub fn on_transition(&self, callback: TransitionCallback) {
        self.callbacks.lock().push(callback);
    }

    fn persist(&self, switch: &DeadManSwitch) -> Result<(), AttestError> {
        self.lock
            .with_lock(|| atomic::write_json(&self.path, switch))?;
        Ok(())
    }

    fn fire(&self, from: DeadManStatus, to: DeadManStatus) {
        for callback in self.callbacks.lock().iter() {
            callback(from, to);
        }
    }

    fn status_for(&self, missed: u64) -> DeadManStatus {
        if missed >= self.config.dead_threshold {
            DeadManStatus::Dead
        } else if missed >= self.config.critical_threshold {
            DeadManStatus::Critical
        } else if missed >= self.config.warning_threshold {
            DeadManStatus::Warning
        } else {
            DeadManStatus::Healthy
        }
    }

    /// Records a check-in at `now`. A dead switch stays dead until reset
    /// with its recovery code.
    pub fn check_in_at(&self, now: i64) -> Result<DeadManStatus, AttestError> {
        let mut inner = self.inner.write();
        if inner.status == DeadManStatus::Dead {
            return Err(AttestError::WrongSwitchState(
                "dead; reset with the recovery code".into(),
            ));
        }
        let mut next = inner.clone();
        next.last_check_in = now;
        next.missed_count = 0;
        let old = next.status;
        next.status = DeadManStatus::Healthy;
        self.persist(&next)?;
        if old != DeadManStatus::Healthy {
            self.fire(old, DeadManStatus::Healthy);
        }
        *inner = next;
        Ok(DeadManStatus::Healthy)
    }

    /// Records a check-in at the current instant.
    pub fn check_in(&self) -> Result<DeadManStatus, AttestError> {
        self.check_in_at(unix_now())
    }

    /// Evaluates the switch at `now`, firing transition callbacks and
    /// minting a recovery code on the transition into `dead`.
    pub fn evaluate_at(&self, now: i64) -> Result<DeadManStatus, AttestError> {
        let mut inner = self.inner.write();
        if !inner.enabled {
            return Ok(inner.status);
        }
        if inner.status == DeadManStatus::Dead {
            return Ok(DeadManStatus::Dead);
        }
        let elapsed = (now - inner.last_check_in - inner.grace_period).max(0);
        let missed = if inner.expected_interval > 0 {
            (elapsed / inner.expected_interval) as u64
        } else {
            0
        };
        let new_status = self.status_for(missed);
        let old_status = inner.status;

        if new_status == old_status && missed == inner.missed_count {
            return Ok(old_status);
        }

        let mut next = inner.clone();
        next.missed_count = missed;
        next.status = new_status;
        if new_status == DeadManStatus::Dead && old_status != DeadManStatus::Dead {
            next.triggered_at = now;
            next.recovery_code = nonce::random_recovery_code();
            tracing::warn!(target: "deadman", missed, "dead-man switch tripped");
        }
        self.persist(&next)?;
        if new_status != old_status {
            self.fire(old_status, new_status);
        }
        *inner = next;
        Ok(new_status)
    }

    /// Evaluates at the current instant.
    pub fn evaluate(&self) -> Result<DeadManStatus, AttestError> {
        self.evaluate_at(unix_now())
    }

    /// Clears a dead switch back to healthy, requiring the exact recovery
    /// code minted when it tripped.
    pub fn reset_at(&self, recovery_code: &str, now: i64) -> Result<(), AttestError> {
        let mut inner = self.inner.write();
        if inner.status != DeadManStatus::Dead {
            return Err(AttestError::WrongSwitchState(format!(
                "{:?}",
                inner.status
            )
            .to_lowercase()));
        }
        if inner.recovery_code.is_empty() || inner.recovery_code != recovery_code {
            return Err(AttestError::RecoveryCodeMismatch);
        }
        let mut next = inner.clone();
        next.status = DeadManStatus::Healthy;
        next.missed_count = 0;
        next.last_check_in = now;
        next.triggered_at = 0;
        next.recovery_code = String::new();
        self.persist(&next)?;
        self.fire(DeadManStatus::Dead, DeadManStatus::Healthy);
        *inner = next;
        tracing::info!(target: "deadman", "dead-man switch reset");
        Ok(())
    }

    /// Resets at the current instant.
    pub fn reset(&self, recovery_code: &str) -> Result<(), AttestError> {
        self.reset_at(recovery_code, unix_now())
    }

    /// A copy of the persisted switch state.
    pub fn state(&self) -> DeadManSwitch {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn config() -> DeadManConfig {
        DeadManConfig {
            expected_interval_secs: 1,
            grace_period_secs: 0,
            warning_threshold: 2,
            critical_threshold: 4,
            dead_threshold: 6,
        }
    }

    fn monitor(dir: &std::path::Path) -> DeadManMonitor {
        let state = StateDir::new(dir);
        state.ensure().unwrap();
        DeadManMonitor::open(&state, config()).unwrap()
    }

    #[test]
    fn full_decay_and_recovery_cycle() {
        let dir = tempdir().unwrap();
        let m = monitor(dir.path());
        let t0 = 1_700_000_000;
        m.check_in_at(t0).unwrap();

        assert_eq!(m.evaluate_at(t0 + 1).unwrap(), DeadManStatus::Healthy);
        assert_eq!(m.evaluate_at(t0 + 3).unwrap(), DeadManStatus::Warning);
        assert_eq!(m.evaluate_at(t0 + 5).unwrap(), DeadManStatus::Critical);
        assert_eq!(m.evaluate_at(t0 + 7).unwrap(), DeadManStatus::Dead);

        let state = m.state();
        assert!(!state.recovery_code.is_empty());
        assert_eq!(state.triggered_at, t0 + 7);

        assert!(matches!(
            m.reset_at("wrong-code", t0 + 8),
            Err(AttestError::RecoveryCodeMismatch)
        ));
        m.reset_at(&state.recovery_code, t0 + 8).unwrap();
        let state = m.state();
        assert_eq!(state.status, DeadManStatus::Healthy);
        assert_eq!(state.missed_count, 0);
        assert!(state.recovery_code.is_empty());
    }

    #[test]
    fn callbacks_fire_only_on_transitions() {
        let dir = tempdir().unwrap();
        let m = monitor(dir.path());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        m.on_transition(Box::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let t0 = 1_700_000_000;
        m.check_in_at(t0).unwrap();
        m.evaluate_at(t0 + 3).unwrap(); // healthy -> warning
        m.evaluate_at(t0 + 3).unwrap(); // steady state, no fire
        m.evaluate_at(t0 + 5).unwrap(); // warning -> critical
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dead_switch_refuses_check_in() {
        let dir = tempdir().unwrap();
        let m = monitor(dir.path());
        let t0 = 1_700_000_000;
        m.check_in_at(t0).unwrap();
        m.evaluate_at(t0 + 10).unwrap();
        assert_eq!(m.state().status, DeadManStatus::Dead);
        assert!(matches!(
            m.check_in_at(t0 + 11),
            Err(AttestError::WrongSwitchState(_))
        ));
    }

    #[test]
    fn grace_period_delays_decay() {
        let dir = tempdir().unwrap();
        let state = StateDir::new(dir.path());
        state.ensure().unwrap();
        let m = DeadManMonitor::open(
            &state,
            DeadManConfig {
                grace_period_secs: 5,
                ..config()
            },
        )
        .unwrap();
        let t0 = 1_700_000_000;
        m.check_in_at(t0).unwrap();
        // 3 s elapsed but 5 s of grace: still healthy.
        assert_eq!(m.evaluate_at(t0 + 3).unwrap(), DeadManStatus::Healthy);
        assert_eq!(m.evaluate_at(t0 + 8).unwrap(), DeadManStatus::Warning);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let t0 = 1_700_000_000;
        {
            let m = monitor(dir.path());
            m.check_in_at(t0).unwrap();
            m.evaluate_at(t0 + 7).unwrap();
        }
        let m = monitor(dir.path());
        assert_eq!(m.state().status, DeadManStatus::Dead);
        assert!(!m.state().recovery_code.is_empty());
    }
}
