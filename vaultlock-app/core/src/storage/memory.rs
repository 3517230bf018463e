//! In-process credential store.
//!
//! Used by embedders that persist elsewhere and by tests. Writes can be made
//! to fail on demand to exercise rollback paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::warn;

use super::store::{CredentialStore, SecurityRecord};
use crate::error::{Result, SecurityError};
use crate::security::{PinRecord, SecurityConfig};

#[derive(Debug, Default)]
struct MemoryState {
    record: SecurityRecord,
    wipes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SecurityRecord) -> Self {
        Self {
            state: Mutex::new(MemoryState { record, wipes: 0 }),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write (including wipes) fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of times `wipe_all_secrets` has succeeded.
    pub fn wipe_count(&self) -> usize {
        self.guard().map(|state| state.wipes).unwrap_or(0)
    }

    /// Copy of the currently stored record.
    pub fn record(&self) -> Result<SecurityRecord> {
        Ok(self.guard()?.record.clone())
    }

    fn guard(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| SecurityError::Persistence("Credential store lock poisoned".into()))
    }

    fn writable(&self) -> Result<MutexGuard<'_, MemoryState>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SecurityError::Persistence("Store is read-only".into()));
        }
        self.guard()
    }
}

impl CredentialStore for MemoryStore {
    fn load_config(&self) -> Result<SecurityConfig> {
        Ok(self.guard()?.record.config)
    }

    fn save_config(&self, config: &SecurityConfig) -> Result<()> {
        self.writable()?.record.config = *config;
        Ok(())
    }

    fn load_pin_verifier(&self) -> Result<Option<PinRecord>> {
        Ok(self.guard()?.record.pin.clone())
    }

    fn save_pin_verifier(&self, record: Option<&PinRecord>) -> Result<()> {
        self.writable()?.record.pin = record.cloned();
        Ok(())
    }

    fn load_failure_counter(&self) -> Result<u32> {
        Ok(self.guard()?.record.failures)
    }

    fn save_failure_counter(&self, failures: u32) -> Result<()> {
        self.writable()?.record.failures = failures;
        Ok(())
    }

    fn wipe_all_secrets(&self) -> Result<()> {
        let mut state = self.writable()?;
        warn!("Wiping in-memory security record");
        state.record = SecurityRecord::default();
        state.wipes += 1;
        Ok(())
    }

    fn save_record(&self, record: &SecurityRecord) -> Result<()> {
        self.writable()?.record = record.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wipe_resets_and_counts() {
        let store = MemoryStore::new();
        store.save_failure_counter(3).unwrap();
        store.wipe_all_secrets().unwrap();

        assert_eq!(store.load_failure_counter().unwrap(), 0);
        assert_eq!(store.wipe_count(), 1);
    }

    #[test]
    fn test_failed_writes_leave_record_untouched() {
        let store = MemoryStore::new();
        store.save_failure_counter(2).unwrap();
        store.set_fail_writes(true);

        assert!(store.save_failure_counter(9).unwrap_err().is_persistence_failure());
        assert!(store.wipe_all_secrets().is_err());
        assert_eq!(store.load_failure_counter().unwrap(), 2);
        assert_eq!(store.wipe_count(), 0);
    }
}
