//! Security settings core for a PIN-protected password vault.
//!
//! The crate owns the rules around the PIN gate, the idle-lock timeout and
//! delete-on-failure: a PIN must exist before the gate can be turned on,
//! delete-on-failure only works behind the gate, and every wrong PIN draws
//! from one persisted budget that wipes the vault when exhausted.
//!
//! Persistence is abstracted by [`CredentialStore`]; [`FileStore`] keeps
//! everything in one JSON record written atomically.

mod error;
mod security;
mod storage;

pub use error::{Result, SecurityError};
pub use security::{
    DeleteThreshold, KdfParams, LockTimeout, LockoutOutcome, LockoutPolicy, PinCandidate,
    PinFlowStage, PinFlowStep, PinIntent, PinLifecycleController, PinPolicy, PinRecord,
    SecurityConfig, SecurityOptions, SecuritySettings, SecurityState, SettingsSnapshot,
    SALT_SIZE, VERIFIER_SIZE,
};
pub use storage::{CredentialStore, FileStore, MemoryStore, SecurityRecord, RECORD_FILE_NAME};
