//! PIN format policy and the one-way PIN verifier.
//!
//! The PIN itself is never stored. A `PinRecord` keeps an installation
//! specific salt and the Argon2id output derived from the PIN, together with
//! the parameters used, so verification stays valid if the defaults change.

use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SecurityError};

/// Salt size in bytes (128 bits)
pub const SALT_SIZE: usize = 16;

/// Verifier size in bytes (256 bits)
pub const VERIFIER_SIZE: usize = 32;

/// Argon2id parameters for PIN verifiers.
///
/// Defaults: 64 MiB memory, 3 iterations, 4 lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    pub fn new(memory_kib: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            time_cost,
            parallelism,
        }
    }

    /// Parameters for low-end devices (16 MiB, 4 iterations, 1 lane).
    pub fn low_memory() -> Self {
        Self::new(16 * 1024, 4, 1)
    }
}

/// Accepted PIN shape: ASCII digits only, length within bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PinPolicy {
    fn default() -> Self {
        Self {
            min_length: 4,
            max_length: 8,
        }
    }
}

impl PinPolicy {
    pub fn validate(&self, pin: &str) -> Result<()> {
        if pin.is_empty() {
            return Err(SecurityError::InvalidPin("PIN must not be empty".into()));
        }
        if !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(SecurityError::InvalidPin(
                "PIN must contain only digits".into(),
            ));
        }
        if pin.len() < self.min_length || pin.len() > self.max_length {
            return Err(SecurityError::InvalidPin(format!(
                "PIN must be {}-{} digits",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }
}

/// New PIN captured during a set/change flow, waiting for confirmation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PinCandidate(String);

impl PinCandidate {
    pub fn new(pin: &str) -> Self {
        Self(pin.to_string())
    }

    /// Constant-time comparison against the confirmation entry.
    pub fn matches(&self, confirmation: &str) -> bool {
        self.0.as_bytes().ct_eq(confirmation.as_bytes()).into()
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for PinCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PinCandidate").field(&"[REDACTED]").finish()
    }
}

/// Stored verifier for the current PIN.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    #[serde(with = "hex")]
    salt: [u8; SALT_SIZE],
    #[serde(with = "hex")]
    verifier: [u8; VERIFIER_SIZE],
    params: KdfParams,
    created_at: DateTime<Utc>,
}

impl PinRecord {
    /// Derive a new record for `pin` with a fresh random salt.
    pub fn create(pin: &str, params: KdfParams) -> Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut salt);

        let verifier = derive_verifier(pin, &salt, &params)?;
        Ok(Self {
            salt,
            verifier,
            params,
            created_at: Utc::now(),
        })
    }

    /// Check `pin` against the stored verifier.
    ///
    /// Returns `Ok(false)` for a wrong PIN; errors only when the KDF itself
    /// fails.
    pub fn verify(&self, pin: &str) -> Result<bool> {
        let mut derived = derive_verifier(pin, &self.salt, &self.params)?;
        let matches: bool = self.verifier[..].ct_eq(&derived[..]).into();
        derived.zeroize();
        Ok(matches)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }
}

impl std::fmt::Debug for PinRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log verifier material
        f.debug_struct("PinRecord")
            .field("verifier", &"[REDACTED]")
            .field("params", &self.params)
            .field("created_at", &self.created_at)
            .finish()
    }
}

fn derive_verifier(
    pin: &str,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> Result<[u8; VERIFIER_SIZE]> {
    let params = Params::new(
        params.memory_kib,
        params.time_cost,
        params.parallelism,
        Some(VERIFIER_SIZE),
    )
    .map_err(|e| SecurityError::KeyDerivation(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; VERIFIER_SIZE];
    argon2
        .hash_password_into(pin.as_bytes(), salt, &mut output)
        .map_err(|e| SecurityError::KeyDerivation(e.to_string()))?;

    debug!("Derived {}-byte PIN verifier", output.len());
    Ok(output)
}
