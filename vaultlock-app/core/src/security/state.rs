//! In-memory mirror of the persisted security record.

use tracing::debug;

use super::config::SecurityConfig;
use super::lockout::LockoutPolicy;
use super::pin::PinRecord;
use crate::error::Result;
use crate::storage::{CredentialStore, SecurityRecord};

/// Last known-good copy of what the store holds.
///
/// Multi-field changes are built on a clone, written with
/// `CredentialStore::save_record`, and only swapped in after the write
/// succeeded.
#[derive(Debug, Clone, Default)]
pub struct SecurityState {
    pub(crate) config: SecurityConfig,
    pub(crate) pin: Option<PinRecord>,
    pub(crate) lockout: LockoutPolicy,
}

impl SecurityState {
    pub fn load<S: CredentialStore + ?Sized>(store: &S) -> Result<Self> {
        let record = store.load_record()?;
        Ok(Self::from_record(record))
    }

    pub fn from_record(record: SecurityRecord) -> Self {
        Self {
            config: record.config,
            pin: record.pin,
            lockout: LockoutPolicy::new(record.failures),
        }
    }

    pub fn to_record(&self) -> SecurityRecord {
        SecurityRecord {
            config: self.config,
            pin: self.pin.clone(),
            failures: self.lockout.failures(),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn pin(&self) -> Option<&PinRecord> {
        self.pin.as_ref()
    }

    pub fn has_pin(&self) -> bool {
        self.pin.is_some()
    }

    pub fn failures(&self) -> u32 {
        self.lockout.failures()
    }

    /// Persist `next` as one record, then adopt it.
    pub(crate) fn commit<S: CredentialStore + ?Sized>(
        &mut self,
        next: SecurityState,
        store: &S,
    ) -> Result<()> {
        store.save_record(&next.to_record())?;
        *self = next;
        debug!("Security record committed");
        Ok(())
    }

    /// Mirror a store wipe: back to first-launch defaults.
    pub(crate) fn reset_after_wipe(&mut self) {
        *self = SecurityState::default();
    }
}
