//! Security-policy state machine.
//!
//! This module provides:
//! - `SecurityConfig` and its enumerated option sets
//! - `LockoutPolicy`: the shared failed-attempt budget and wipe trigger
//! - `PinLifecycleController`: the set/change/remove PIN flow
//! - `SecuritySettings`: the facade that keeps the cross-field rules
//!
//! PINs are checked against an Argon2id verifier; the PIN itself is never
//! stored.

mod config;
mod flow;
mod lockout;
mod pin;
mod settings;
mod state;

pub use config::{DeleteThreshold, LockTimeout, SecurityConfig};
pub use flow::{PinFlowStage, PinFlowStep, PinIntent, PinLifecycleController};
pub use lockout::{LockoutOutcome, LockoutPolicy};
pub use pin::{KdfParams, PinCandidate, PinPolicy, PinRecord, SALT_SIZE, VERIFIER_SIZE};
pub use settings::{SecurityOptions, SecuritySettings, SettingsSnapshot};
pub use state::SecurityState;
