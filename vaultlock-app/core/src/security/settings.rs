//! The security settings facade.
//!
//! `SecuritySettings` is the single owner of the in-memory security state
//! and the only way to change it. Every setter validates, writes to the
//! credential store, and only then updates memory, so a failed call never
//! leaves a partial change behind.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::config::{DeleteThreshold, LockTimeout, SecurityConfig};
use super::flow::{PinFlowStage, PinFlowStep, PinIntent, PinLifecycleController};
use super::lockout::LockoutOutcome;
use super::pin::{KdfParams, PinPolicy};
use super::state::SecurityState;
use crate::error::{Result, SecurityError};
use crate::storage::CredentialStore;

/// Tunables that are not part of the persisted configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityOptions {
    pub pin_policy: PinPolicy,
    pub kdf: KdfParams,
}

/// Read-only view for the UI layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub config: SecurityConfig,
    pub has_pin: bool,
    pub failed_attempts: u32,
    pub remaining_attempts: u32,
    pub pin_flow: PinFlowStage,
}

pub struct SecuritySettings<S: CredentialStore> {
    store: S,
    state: SecurityState,
    flow: PinLifecycleController,
}

impl<S: CredentialStore> SecuritySettings<S> {
    /// Load the settings from `store` with default PIN policy and KDF
    /// parameters.
    pub fn load(store: S) -> Result<Self> {
        Self::load_with_options(store, SecurityOptions::default())
    }

    /// Load the settings from `store`.
    ///
    /// A stored record that breaks the PIN rules (delete-on-failure without
    /// a PIN gate, or a PIN gate without a verifier) is repaired and written
    /// back.
    pub fn load_with_options(store: S, options: SecurityOptions) -> Result<Self> {
        let mut state = SecurityState::load(&store)?;

        if let Some(repaired) = repair(&state) {
            warn!("Stored security record was inconsistent, repairing");
            state.commit(repaired, &store)?;
        }

        info!(
            "Security settings loaded (pin: {}, delete on failure: {}, failures: {})",
            state.config.pin_enabled,
            state.config.delete_on_failure_enabled,
            state.failures()
        );

        Ok(Self {
            store,
            state,
            flow: PinLifecycleController::new(options.pin_policy, options.kdf),
        })
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.state.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn has_pin(&self) -> bool {
        self.state.has_pin()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.state.failures()
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.state.lockout.current_remaining(&self.state.config)
    }

    /// Idle timeout for the session manager; `None` means never lock.
    pub fn lock_timeout_duration(&self) -> Option<Duration> {
        self.state.config.lock_timeout.as_duration()
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            config: self.state.config,
            has_pin: self.has_pin(),
            failed_attempts: self.failed_attempts(),
            remaining_attempts: self.remaining_attempts(),
            pin_flow: self.flow.stage(),
        }
    }

    // =========================================================================
    // Setters
    // =========================================================================

    /// Turn the PIN gate on or off.
    ///
    /// Off clears the PIN, delete-on-failure and the failure counter in one
    /// write. On requires a committed PIN: without one, the set-PIN flow is
    /// started and `PinRequired` is returned with nothing changed.
    pub fn set_pin_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled {
            if self.state.has_pin() {
                return self.update_config(|config| config.pin_enabled = true);
            }
            if self.flow.intent() != Some(PinIntent::Set) {
                self.flow.begin(PinIntent::Set, &self.state)?;
            }
            return Err(SecurityError::PinRequired);
        }

        let config = &self.state.config;
        if !config.pin_enabled
            && !config.delete_on_failure_enabled
            && !self.state.has_pin()
            && self.state.failures() == 0
        {
            // a set flow started by an earlier `set_pin_enabled(true)` must not
            // commit after the gate was turned off
            self.flow.cancel();
            return Ok(());
        }

        let mut next = self.state.clone();
        next.pin = None;
        next.config.pin_enabled = false;
        next.config.delete_on_failure_enabled = false;
        next.lockout.clear();
        self.state.commit(next, &self.store)?;
        self.flow.cancel();

        info!("PIN gate disabled");
        Ok(())
    }

    pub fn set_lock_timeout(&mut self, timeout: LockTimeout) -> Result<()> {
        self.update_config(|config| config.lock_timeout = timeout)
    }

    /// Same as `set_lock_timeout`, from a raw seconds value (`-1` = never).
    pub fn set_lock_timeout_seconds(&mut self, seconds: i64) -> Result<()> {
        let timeout = LockTimeout::from_seconds(seconds)?;
        self.set_lock_timeout(timeout)
    }

    /// Enabling requires the PIN gate. Any change of this flag restarts the
    /// failure count.
    pub fn set_delete_on_failure_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled && !self.state.config.pin_enabled {
            return Err(SecurityError::InvariantViolation(
                "delete on failure requires the PIN gate".into(),
            ));
        }
        if enabled == self.state.config.delete_on_failure_enabled {
            return Ok(());
        }

        let mut next = self.state.clone();
        next.config.delete_on_failure_enabled = enabled;
        next.lockout.clear();
        self.state.commit(next, &self.store)?;

        info!("Delete on failure {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn set_delete_on_failure_threshold(&mut self, threshold: DeleteThreshold) -> Result<()> {
        self.update_config(|config| config.delete_on_failure_threshold = threshold)
    }

    pub fn set_delete_on_failure_threshold_count(&mut self, attempts: u32) -> Result<()> {
        let threshold = DeleteThreshold::from_attempts(attempts)?;
        self.set_delete_on_failure_threshold(threshold)
    }

    pub fn set_remember_passwords_enabled(&mut self, enabled: bool) -> Result<()> {
        self.update_config(|config| config.remember_passwords_enabled = enabled)
    }

    pub fn set_hide_passwords_enabled(&mut self, enabled: bool) -> Result<()> {
        self.update_config(|config| config.hide_passwords_enabled = enabled)
    }

    pub fn set_cloud_linked(&mut self, linked: bool) -> Result<()> {
        self.update_config(|config| config.cloud_linked = linked)
    }

    fn update_config<F>(&mut self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut SecurityConfig),
    {
        let mut next = self.state.config;
        apply(&mut next);
        if next == self.state.config {
            return Ok(());
        }

        self.store.save_config(&next)?;
        self.state.config = next;
        info!("Security config updated");
        Ok(())
    }

    // =========================================================================
    // Unlock gate and failure budget
    // =========================================================================

    /// Check the PIN entered at the lock screen.
    pub fn verify_unlock_pin(&mut self, pin: &str) -> Result<()> {
        if !self.state.config.pin_enabled {
            return Err(SecurityError::NoPinSet);
        }
        let verified = match self.state.pin() {
            Some(record) => record.verify(pin)?,
            None => return Err(SecurityError::NoPinSet),
        };

        if verified {
            return self.record_success();
        }

        match self.record_failure()? {
            LockoutOutcome::Continue { remaining } => {
                Err(SecurityError::VerificationFailed { remaining })
            }
            LockoutOutcome::Triggered => Err(SecurityError::Triggered),
        }
    }

    /// Count a failed verification made elsewhere in the app.
    ///
    /// On `Triggered` the store has been wiped and these settings are back
    /// to their first-launch defaults.
    pub fn record_failure(&mut self) -> Result<LockoutOutcome> {
        let outcome = self
            .state
            .lockout
            .record_failure(&self.state.config, &self.store)?;

        if outcome == LockoutOutcome::Triggered {
            self.state.reset_after_wipe();
            self.flow.cancel();
        }
        Ok(outcome)
    }

    pub fn record_success(&mut self) -> Result<()> {
        self.state.lockout.record_success(&self.store)
    }

    // =========================================================================
    // PIN flow
    // =========================================================================

    pub fn begin_set_pin(&mut self) -> Result<PinFlowStage> {
        self.flow.begin(PinIntent::Set, &self.state)
    }

    pub fn begin_change_pin(&mut self) -> Result<PinFlowStage> {
        self.flow.begin(PinIntent::Change, &self.state)
    }

    pub fn begin_remove_pin(&mut self) -> Result<PinFlowStage> {
        self.flow.begin(PinIntent::Remove, &self.state)
    }

    pub fn submit_pin(&mut self, input: &str) -> Result<PinFlowStep> {
        self.flow.submit(input, &mut self.state, &self.store)
    }

    pub fn cancel_pin_flow(&mut self) {
        self.flow.cancel();
    }

    pub fn pin_flow_stage(&self) -> PinFlowStage {
        self.flow.stage()
    }

    pub fn pin_flow_intent(&self) -> Option<PinIntent> {
        self.flow.intent()
    }
}

fn repair(state: &SecurityState) -> Option<SecurityState> {
    let mut next = state.clone();
    if next.config.pin_enabled && next.pin.is_none() {
        next.config.pin_enabled = false;
    }
    if !next.config.is_consistent() {
        next.config.delete_on_failure_enabled = false;
        next.lockout.clear();
    }

    (next.config != state.config).then_some(next)
}
