//! Failed-attempt counter and the delete-on-failure trigger.
//!
//! Every wrong PIN, whether entered at unlock or while changing/removing the
//! PIN, draws from the same budget. When delete-on-failure is enabled and the
//! counter reaches the configured threshold, the credential store is wiped.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::SecurityConfig;
use crate::error::Result;
use crate::storage::CredentialStore;

/// Result of recording a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LockoutOutcome {
    /// More attempts are allowed. `remaining` is the threshold itself while
    /// delete-on-failure is off.
    Continue { remaining: u32 },
    /// The threshold was reached and all secrets were erased.
    Triggered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockoutPolicy {
    failures: u32,
}

impl LockoutPolicy {
    pub fn new(failures: u32) -> Self {
        Self { failures }
    }

    pub fn load<S: CredentialStore + ?Sized>(store: &S) -> Result<Self> {
        Ok(Self::new(store.load_failure_counter()?))
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Attempts left before the wipe, floored at zero.
    pub fn current_remaining(&self, config: &SecurityConfig) -> u32 {
        let threshold = config.delete_on_failure_threshold.attempts();
        if !config.delete_on_failure_enabled {
            return threshold;
        }
        threshold.saturating_sub(self.failures)
    }

    /// Count one failed verification.
    ///
    /// If the counter write or the wipe fails the in-memory counter is left
    /// as it was, so the next failure re-evaluates the same threshold.
    pub fn record_failure<S: CredentialStore + ?Sized>(
        &mut self,
        config: &SecurityConfig,
        store: &S,
    ) -> Result<LockoutOutcome> {
        let failures = self.failures.saturating_add(1);

        match config.active_threshold() {
            Some(threshold) if failures >= threshold => {
                warn!(
                    "Failed attempt {} reached delete threshold {} - wiping all secrets",
                    failures, threshold
                );
                store.wipe_all_secrets()?;
                self.failures = 0;
                Ok(LockoutOutcome::Triggered)
            }
            _ => {
                store.save_failure_counter(failures)?;
                self.failures = failures;
                let remaining = self.current_remaining(config);
                info!("Failed PIN attempt {} ({} remaining)", failures, remaining);
                Ok(LockoutOutcome::Continue { remaining })
            }
        }
    }

    /// Reset after a successful verification. No store write when already
    /// at zero.
    pub fn record_success<S: CredentialStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if self.failures > 0 {
            debug!("PIN verified, clearing {} failed attempts", self.failures);
        }
        self.reset(store)
    }

    /// Force the counter to zero.
    pub fn reset<S: CredentialStore + ?Sized>(&mut self, store: &S) -> Result<()> {
        if self.failures == 0 {
            return Ok(());
        }
        store.save_failure_counter(0)?;
        self.failures = 0;
        Ok(())
    }

    /// Forget the in-memory count without touching the store. Used after a
    /// wipe or an atomic record write that already persisted zero.
    pub(crate) fn clear(&mut self) {
        self.failures = 0;
    }
}
