//! The credential store contract.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::security::{PinRecord, SecurityConfig};

/// Everything this crate persists, as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRecord {
    #[serde(default)]
    pub config: SecurityConfig,

    /// Verifier of the current PIN, if one is set
    #[serde(default)]
    pub pin: Option<PinRecord>,

    /// Consecutive failed PIN verifications
    #[serde(default)]
    pub failures: u32,
}

/// Persistent storage for the security settings, PIN verifier and failure
/// counter.
///
/// Methods take `&self`; implementations serialize access internally and
/// must release any lock on every exit path. `wipe_all_secrets` is
/// irreversible: afterwards every load returns the defaults.
pub trait CredentialStore {
    fn load_config(&self) -> Result<SecurityConfig>;
    fn save_config(&self, config: &SecurityConfig) -> Result<()>;

    fn load_pin_verifier(&self) -> Result<Option<PinRecord>>;
    /// `None` removes the stored verifier.
    fn save_pin_verifier(&self, record: Option<&PinRecord>) -> Result<()>;

    fn load_failure_counter(&self) -> Result<u32>;
    fn save_failure_counter(&self, failures: u32) -> Result<()>;

    /// Erase every secret this store knows about, including the failure
    /// counter and configuration.
    fn wipe_all_secrets(&self) -> Result<()>;

    fn load_record(&self) -> Result<SecurityRecord> {
        Ok(SecurityRecord {
            config: self.load_config()?,
            pin: self.load_pin_verifier()?,
            failures: self.load_failure_counter()?,
        })
    }

    /// Persist several fields together.
    ///
    /// The provided version writes field by field; stores that can write
    /// the whole record in one step should override it.
    fn save_record(&self, record: &SecurityRecord) -> Result<()> {
        self.save_pin_verifier(record.pin.as_ref())?;
        self.save_failure_counter(record.failures)?;
        self.save_config(&record.config)
    }
}
