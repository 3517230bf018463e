//! Persisted security settings and their enumerated option sets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SecurityError;

/// Idle time before the vault locks itself.
///
/// Serialized as seconds: `0` for immediate, `-1` for never.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum LockTimeout {
    #[default]
    Immediate,
    Seconds30,
    Seconds60,
    Seconds120,
    Seconds300,
    Never,
}

impl LockTimeout {
    /// All selectable values, in display order.
    pub const ALL: [LockTimeout; 6] = [
        Self::Immediate,
        Self::Seconds30,
        Self::Seconds60,
        Self::Seconds120,
        Self::Seconds300,
        Self::Never,
    ];

    pub fn as_seconds(self) -> i64 {
        match self {
            Self::Immediate => 0,
            Self::Seconds30 => 30,
            Self::Seconds60 => 60,
            Self::Seconds120 => 120,
            Self::Seconds300 => 300,
            Self::Never => -1,
        }
    }

    pub fn from_seconds(seconds: i64) -> Result<Self, SecurityError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_seconds() == seconds)
            .ok_or_else(|| {
                SecurityError::InvalidOption(format!("lock timeout {} seconds", seconds))
            })
    }

    /// Idle duration for the session manager. `None` means never lock.
    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Never => None,
            other => Some(Duration::from_secs(other.as_seconds() as u64)),
        }
    }
}

impl TryFrom<i64> for LockTimeout {
    type Error = SecurityError;

    fn try_from(seconds: i64) -> Result<Self, Self::Error> {
        Self::from_seconds(seconds)
    }
}

impl From<LockTimeout> for i64 {
    fn from(timeout: LockTimeout) -> Self {
        timeout.as_seconds()
    }
}

impl std::fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediately"),
            Self::Never => write!(f, "never"),
            other => write!(f, "{} seconds", other.as_seconds()),
        }
    }
}

/// Number of failed attempts after which the vault is wiped.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DeleteThreshold {
    One,
    Three,
    #[default]
    Five,
    Ten,
    Fifteen,
}

impl DeleteThreshold {
    pub const ALL: [DeleteThreshold; 5] =
        [Self::One, Self::Three, Self::Five, Self::Ten, Self::Fifteen];

    pub fn attempts(self) -> u32 {
        match self {
            Self::One => 1,
            Self::Three => 3,
            Self::Five => 5,
            Self::Ten => 10,
            Self::Fifteen => 15,
        }
    }

    pub fn from_attempts(attempts: u32) -> Result<Self, SecurityError> {
        Self::ALL
            .into_iter()
            .find(|t| t.attempts() == attempts)
            .ok_or_else(|| {
                SecurityError::InvalidOption(format!("delete threshold of {} attempts", attempts))
            })
    }
}

impl TryFrom<u32> for DeleteThreshold {
    type Error = SecurityError;

    fn try_from(attempts: u32) -> Result<Self, Self::Error> {
        Self::from_attempts(attempts)
    }
}

impl From<DeleteThreshold> for u32 {
    fn from(threshold: DeleteThreshold) -> Self {
        threshold.attempts()
    }
}

impl std::fmt::Display for DeleteThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.attempts())
    }
}

/// The process-wide security configuration.
///
/// Only `SecuritySettings` mutates this; the cross-field rules live in its
/// setters. Missing fields in a stored record fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub pin_enabled: bool,
    pub lock_timeout: LockTimeout,
    pub delete_on_failure_enabled: bool,
    /// Retained while delete-on-failure is off, but not consulted.
    pub delete_on_failure_threshold: DeleteThreshold,
    pub remember_passwords_enabled: bool,
    pub hide_passwords_enabled: bool,
    /// Whether a cloud-storage account is linked. Linking itself happens
    /// outside this crate.
    pub cloud_linked: bool,
}

impl SecurityConfig {
    /// `true` when the stored flags satisfy the PIN / delete-on-failure rule.
    pub fn is_consistent(&self) -> bool {
        !self.delete_on_failure_enabled || self.pin_enabled
    }

    /// Threshold in attempts, only when delete-on-failure is active.
    pub fn active_threshold(&self) -> Option<u32> {
        self.delete_on_failure_enabled
            .then(|| self.delete_on_failure_threshold.attempts())
    }
}
