//! PIN set/change/remove flow.
//!
//! The flow is a small state machine driven by discrete commands from the UI
//! layer:
//! - `Idle` → `AwaitingNewPin` (set, no PIN yet)
//! - `Idle` → `AwaitingCurrentPin` (change or remove an existing PIN)
//! - `AwaitingCurrentPin` → `AwaitingNewPin` (change, PIN verified)
//! - `AwaitingCurrentPin` → `Idle` (remove, PIN verified and cleared)
//! - `AwaitingNewPin` → `AwaitingConfirmation` (candidate accepted)
//! - `AwaitingConfirmation` → `Idle` (confirmation matched, PIN committed)
//! - `AwaitingConfirmation` → `AwaitingNewPin` (mismatch, candidate dropped)
//!
//! `cancel` returns to `Idle` from anywhere without touching the store.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::lockout::LockoutOutcome;
use super::pin::{KdfParams, PinCandidate, PinPolicy, PinRecord};
use super::state::SecurityState;
use crate::error::{Result, SecurityError};
use crate::storage::CredentialStore;

/// What the running flow is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinIntent {
    Set,
    Change,
    Remove,
}

/// Observable stage of the flow, without any PIN material.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinFlowStage {
    #[default]
    Idle,
    AwaitingCurrentPin,
    AwaitingNewPin,
    AwaitingConfirmation,
}

/// Successful result of `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", content = "value", rename_all = "snake_case")]
pub enum PinFlowStep {
    /// The flow moved on and waits for the next entry.
    Next(PinFlowStage),
    /// The flow finished and its change is persisted.
    Committed(PinIntent),
}

#[derive(Default, Debug)]
enum FlowState {
    #[default]
    Idle,
    AwaitingCurrentPin {
        intent: PinIntent,
    },
    AwaitingNewPin {
        intent: PinIntent,
    },
    AwaitingConfirmation {
        intent: PinIntent,
        candidate: PinCandidate,
    },
}

#[derive(Debug)]
pub struct PinLifecycleController {
    state: FlowState,
    policy: PinPolicy,
    kdf: KdfParams,
}

impl Default for PinLifecycleController {
    fn default() -> Self {
        Self::new(PinPolicy::default(), KdfParams::default())
    }
}

impl PinLifecycleController {
    pub fn new(policy: PinPolicy, kdf: KdfParams) -> Self {
        Self {
            state: FlowState::Idle,
            policy,
            kdf,
        }
    }

    pub fn stage(&self) -> PinFlowStage {
        match self.state {
            FlowState::Idle => PinFlowStage::Idle,
            FlowState::AwaitingCurrentPin { .. } => PinFlowStage::AwaitingCurrentPin,
            FlowState::AwaitingNewPin { .. } => PinFlowStage::AwaitingNewPin,
            FlowState::AwaitingConfirmation { .. } => PinFlowStage::AwaitingConfirmation,
        }
    }

    pub fn intent(&self) -> Option<PinIntent> {
        match self.state {
            FlowState::Idle => None,
            FlowState::AwaitingCurrentPin { intent }
            | FlowState::AwaitingNewPin { intent }
            | FlowState::AwaitingConfirmation { intent, .. } => Some(intent),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, FlowState::Idle)
    }

    pub fn policy(&self) -> &PinPolicy {
        &self.policy
    }

    /// Start a flow. Set skips the current-PIN challenge; change and remove
    /// require an existing PIN.
    pub fn begin(&mut self, intent: PinIntent, security: &SecurityState) -> Result<PinFlowStage> {
        if !self.is_idle() {
            return Err(SecurityError::FlowInProgress);
        }

        self.state = match (intent, security.has_pin()) {
            (PinIntent::Set, true) => return Err(SecurityError::PinAlreadySet),
            (PinIntent::Set, false) => FlowState::AwaitingNewPin { intent },
            (_, false) => return Err(SecurityError::NoPinSet),
            (_, true) => FlowState::AwaitingCurrentPin { intent },
        };

        debug!("PIN flow started: {:?}", intent);
        Ok(self.stage())
    }

    /// Abandon the flow. Any captured candidate is zeroized.
    pub fn cancel(&mut self) {
        if !self.is_idle() {
            debug!("PIN flow cancelled at {:?}", self.stage());
        }
        self.state = FlowState::Idle;
    }

    /// Feed one PIN entry into the current stage.
    pub fn submit<S: CredentialStore + ?Sized>(
        &mut self,
        input: &str,
        security: &mut SecurityState,
        store: &S,
    ) -> Result<PinFlowStep> {
        match std::mem::take(&mut self.state) {
            FlowState::Idle => Err(SecurityError::NoFlowInProgress),
            FlowState::AwaitingCurrentPin { intent } => {
                self.state = FlowState::AwaitingCurrentPin { intent };
                self.verify_current(intent, input, security, store)
            }
            FlowState::AwaitingNewPin { intent } => {
                self.state = FlowState::AwaitingNewPin { intent };
                self.policy.validate(input)?;
                self.state = FlowState::AwaitingConfirmation {
                    intent,
                    candidate: PinCandidate::new(input),
                };
                Ok(PinFlowStep::Next(PinFlowStage::AwaitingConfirmation))
            }
            FlowState::AwaitingConfirmation { intent, candidate } => {
                if !candidate.matches(input) {
                    // candidate is dropped (and zeroized) here
                    self.state = FlowState::AwaitingNewPin { intent };
                    debug!("PIN confirmation mismatch");
                    return Err(SecurityError::ConfirmationMismatch);
                }

                match self.commit_new_pin(&candidate, security, store) {
                    Ok(()) => {
                        info!("PIN committed ({:?})", intent);
                        Ok(PinFlowStep::Committed(intent))
                    }
                    Err(e) => {
                        self.state = FlowState::AwaitingConfirmation { intent, candidate };
                        Err(e)
                    }
                }
            }
        }
    }

    fn verify_current<S: CredentialStore + ?Sized>(
        &mut self,
        intent: PinIntent,
        input: &str,
        security: &mut SecurityState,
        store: &S,
    ) -> Result<PinFlowStep> {
        let verified = match security.pin() {
            Some(record) => record.verify(input)?,
            None => {
                self.state = FlowState::Idle;
                return Err(SecurityError::NoPinSet);
            }
        };

        if !verified {
            return match security.lockout.record_failure(&security.config, store)? {
                LockoutOutcome::Continue { remaining } => {
                    Err(SecurityError::VerificationFailed { remaining })
                }
                LockoutOutcome::Triggered => {
                    warn!("PIN flow aborted by delete-on-failure");
                    security.reset_after_wipe();
                    self.state = FlowState::Idle;
                    Err(SecurityError::Triggered)
                }
            };
        }

        security.lockout.record_success(store)?;

        match intent {
            PinIntent::Remove => {
                let mut next = security.clone();
                next.pin = None;
                next.config.pin_enabled = false;
                next.config.delete_on_failure_enabled = false;
                next.lockout.clear();
                security.commit(next, store)?;

                self.state = FlowState::Idle;
                info!("PIN removed");
                Ok(PinFlowStep::Committed(PinIntent::Remove))
            }
            PinIntent::Set | PinIntent::Change => {
                self.state = FlowState::AwaitingNewPin { intent };
                Ok(PinFlowStep::Next(PinFlowStage::AwaitingNewPin))
            }
        }
    }

    fn commit_new_pin<S: CredentialStore + ?Sized>(
        &mut self,
        candidate: &PinCandidate,
        security: &mut SecurityState,
        store: &S,
    ) -> Result<()> {
        let record = PinRecord::create(candidate.expose(), self.kdf)?;

        let mut next = security.clone();
        next.pin = Some(record);
        next.config.pin_enabled = true;
        next.lockout.clear();
        security.commit(next, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::DeleteThreshold;
    use crate::storage::MemoryStore;

    fn controller() -> PinLifecycleController {
        PinLifecycleController::new(PinPolicy::default(), KdfParams::new(1024, 1, 1))
    }

    fn with_pin(pin: &str) -> (MemoryStore, SecurityState) {
        let store = MemoryStore::new();
        let mut security = SecurityState::default();
        let mut flow = controller();
        flow.begin(PinIntent::Set, &security).unwrap();
        flow.submit(pin, &mut security, &store).unwrap();
        flow.submit(pin, &mut security, &store).unwrap();
        (store, security)
    }

    #[test]
    fn test_set_flow_commits_pin() {
        let store = MemoryStore::new();
        let mut security = SecurityState::default();
        let mut flow = controller();

        assert_eq!(
            flow.begin(PinIntent::Set, &security).unwrap(),
            PinFlowStage::AwaitingNewPin
        );
        assert_eq!(
            flow.submit("1234", &mut security, &store).unwrap(),
            PinFlowStep::Next(PinFlowStage::AwaitingConfirmation)
        );
        assert_eq!(
            flow.submit("1234", &mut security, &store).unwrap(),
            PinFlowStep::Committed(PinIntent::Set)
        );

        assert!(flow.is_idle());
        assert!(security.config().pin_enabled);
        let stored = store.record().unwrap();
        assert!(stored.config.pin_enabled);
        assert!(stored.pin.unwrap().verify("1234").unwrap());
    }

    #[test]
    fn test_confirmation_mismatch_returns_to_new_pin() {
        let store = MemoryStore::new();
        let mut security = SecurityState::default();
        let mut flow = controller();

        flow.begin(PinIntent::Set, &security).unwrap();
        flow.submit("1234", &mut security, &store).unwrap();
        let err = flow.submit("4321", &mut security, &store).unwrap_err();

        assert!(matches!(err, SecurityError::ConfirmationMismatch));
        assert_eq!(flow.stage(), PinFlowStage::AwaitingNewPin);
        assert!(!security.has_pin());
        assert_eq!(store.record().unwrap().pin, None);

        // The old candidate is gone: confirming it now is treated as a new
        // candidate, not a confirmation
        assert_eq!(
            flow.submit("1234", &mut security, &store).unwrap(),
            PinFlowStep::Next(PinFlowStage::AwaitingConfirmation)
        );
    }

    #[test]
    fn test_invalid_candidate_stays_in_new_pin() {
        let store = MemoryStore::new();
        let mut security = SecurityState::default();
        let mut flow = controller();

        flow.begin(PinIntent::Set, &security).unwrap();
        let err = flow.submit("12", &mut security, &store).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidPin(_)));
        assert_eq!(flow.stage(), PinFlowStage::AwaitingNewPin);
    }

    #[test]
    fn test_change_requires_current_pin() {
        let (store, mut security) = with_pin("1234");
        let mut flow = controller();

        assert_eq!(
            flow.begin(PinIntent::Change, &security).unwrap(),
            PinFlowStage::AwaitingCurrentPin
        );
        flow.submit("1234", &mut security, &store).unwrap();
        flow.submit("8642", &mut security, &store).unwrap();
        assert_eq!(
            flow.submit("8642", &mut security, &store).unwrap(),
            PinFlowStep::Committed(PinIntent::Change)
        );

        let pin = security.pin().unwrap();
        assert!(pin.verify("8642").unwrap());
        assert!(!pin.verify("1234").unwrap());
    }

    #[test]
    fn test_wrong_current_pin_counts_as_failure() {
        let (store, mut security) = with_pin("1234");
        let mut flow = controller();

        flow.begin(PinIntent::Change, &security).unwrap();
        let err = flow.submit("0000", &mut security, &store).unwrap_err();

        assert!(matches!(
            err,
            SecurityError::VerificationFailed { remaining: 5 }
        ));
        assert_eq!(flow.stage(), PinFlowStage::AwaitingCurrentPin);
        assert_eq!(security.failures(), 1);
        assert_eq!(store.load_failure_counter().unwrap(), 1);

        // Correct entry clears the counter
        flow.submit("1234", &mut security, &store).unwrap();
        assert_eq!(security.failures(), 0);
    }

    #[test]
    fn test_wrong_current_pin_can_trigger_wipe() {
        let (store, mut security) = with_pin("1234");
        security.config.delete_on_failure_enabled = true;
        security.config.delete_on_failure_threshold = DeleteThreshold::One;
        let mut flow = controller();

        flow.begin(PinIntent::Remove, &security).unwrap();
        let err = flow.submit("9999", &mut security, &store).unwrap_err();

        assert!(matches!(err, SecurityError::Triggered));
        assert!(flow.is_idle());
        assert!(!security.has_pin());
        assert!(!security.config().pin_enabled);
        assert_eq!(store.wipe_count(), 1);
    }

    #[test]
    fn test_remove_cascades() {
        let (store, mut security) = with_pin("1234");
        security.config.delete_on_failure_enabled = true;
        let mut flow = controller();

        flow.begin(PinIntent::Remove, &security).unwrap();
        assert_eq!(
            flow.submit("1234", &mut security, &store).unwrap(),
            PinFlowStep::Committed(PinIntent::Remove)
        );

        assert!(!security.has_pin());
        assert!(!security.config().pin_enabled);
        assert!(!security.config().delete_on_failure_enabled);
        let stored = store.record().unwrap();
        assert_eq!(stored.pin, None);
        assert!(!stored.config.delete_on_failure_enabled);
    }

    #[test]
    fn test_cancel_from_every_stage_leaves_store_alone() {
        let (store, mut security) = with_pin("1234");
        let mut flow = controller();

        flow.begin(PinIntent::Change, &security).unwrap();
        let _ = flow.submit("1111", &mut security, &store);
        let before = store.record().unwrap();

        // AwaitingCurrentPin
        flow.cancel();
        assert!(flow.is_idle());

        // AwaitingNewPin
        flow.begin(PinIntent::Change, &security).unwrap();
        flow.submit("1234", &mut security, &store).unwrap();
        flow.cancel();
        assert!(flow.is_idle());

        // AwaitingConfirmation
        flow.begin(PinIntent::Change, &security).unwrap();
        flow.submit("1234", &mut security, &store).unwrap();
        flow.submit("5555", &mut security, &store).unwrap();
        flow.cancel();
        assert!(flow.is_idle());

        let after = store.record().unwrap();
        assert_eq!(after.pin, before.pin);
        assert!(security.pin().unwrap().verify("1234").unwrap());
    }

    #[test]
    fn test_cancel_does_not_touch_counter() {
        let (store, mut security) = with_pin("1234");
        let mut flow = controller();

        flow.begin(PinIntent::Remove, &security).unwrap();
        let _ = flow.submit("1111", &mut security, &store);
        flow.cancel();

        assert_eq!(security.failures(), 1);
        assert_eq!(store.load_failure_counter().unwrap(), 1);
    }

    #[test]
    fn test_begin_guards() {
        let store = MemoryStore::new();
        let mut security = SecurityState::default();
        let mut flow = controller();

        assert!(matches!(
            flow.begin(PinIntent::Change, &security),
            Err(SecurityError::NoPinSet)
        ));
        assert!(matches!(
            flow.begin(PinIntent::Remove, &security),
            Err(SecurityError::NoPinSet)
        ));
        assert!(matches!(
            flow.submit("1234", &mut security, &store),
            Err(SecurityError::NoFlowInProgress)
        ));

        flow.begin(PinIntent::Set, &security).unwrap();
        assert!(matches!(
            flow.begin(PinIntent::Set, &security),
            Err(SecurityError::FlowInProgress)
        ));

        let (_, security) = with_pin("1234");
        let mut flow = controller();
        assert!(matches!(
            flow.begin(PinIntent::Set, &security),
            Err(SecurityError::PinAlreadySet)
        ));
    }

    #[test]
    fn test_failed_commit_keeps_confirmation_stage() {
        let store = MemoryStore::new();
        let mut security = SecurityState::default();
        let mut flow = controller();

        flow.begin(PinIntent::Set, &security).unwrap();
        flow.submit("1234", &mut security, &store).unwrap();

        store.set_fail_writes(true);
        let err = flow.submit("1234", &mut security, &store).unwrap_err();
        assert!(err.is_persistence_failure());
        assert_eq!(flow.stage(), PinFlowStage::AwaitingConfirmation);
        assert!(!security.has_pin());
        assert!(!security.config().pin_enabled);

        store.set_fail_writes(false);
        assert_eq!(
            flow.submit("1234", &mut security, &store).unwrap(),
            PinFlowStep::Committed(PinIntent::Set)
        );
    }
}
