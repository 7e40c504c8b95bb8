// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device lifecycle state machine
//!
//! ```text
//! New --(keys generated)--> Initialized --(keys sealed)--> Sealed
//!  ^                             |                          |
//!  +------(generation failed)----+                (integrity failed)
//!  |                                                        v
//!  +------------------(factory reset)------------------ Compromised
//! ```
//!
//! `Initialized` only exists in memory for the duration of key generation,
//! it is persisted as `New`. `Compromised` is only left via factory reset.

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

/// Device lifecycle state
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Debug,
    EnumString,
    Display,
    EnumVariantNames,
    EnumIter,
    TryFromPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DeviceState {
    /// No keys, initial state
    New = 0,
    /// Keys generated but not yet sealed
    Initialized = 1,
    /// Keys sealed, integrity protocol active
    Sealed = 2,
    /// Tamper detected, keys disclosable
    Compromised = 3,
}

/// Inputs to the lifecycle state machine
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter)]
pub enum Trigger {
    /// Keypair generated and persisted
    KeysGenerated,
    /// Seal created and key record marked sealed
    KeysSealed,
    /// Key generation or sealing failed
    GenerationFailed,
    /// Integrity check returned not intact
    IntegrityFailed,
    /// Explicit operator factory reset
    FactoryReset,
}

impl DeviceState {
    /// Compute the next state for a trigger, `None` if the
    /// transition is not permitted from this state
    pub fn next(self, trigger: Trigger) -> Option<DeviceState> {
        use DeviceState::*;

        match (self, trigger) {
            (_, Trigger::FactoryReset) => Some(New),
            (New, Trigger::KeysGenerated) => Some(Initialized),
            (Initialized, Trigger::KeysSealed) => Some(Sealed),
            (Initialized, Trigger::GenerationFailed) => Some(New),
            (Sealed, Trigger::IntegrityFailed) => Some(Compromised),
            _ => None,
        }
    }

    /// State as written to storage
    pub fn persisted(self) -> DeviceState {
        match self {
            DeviceState::Initialized => DeviceState::New,
            s => s,
        }
    }

    /// Check whether a key generation has been sealed on this device
    pub fn has_keys(self) -> bool {
        matches!(self, DeviceState::Sealed | DeviceState::Compromised)
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState::New
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn transitions() {
        use DeviceState::*;

        let tests = &[
            (New, Trigger::KeysGenerated, Some(Initialized)),
            (New, Trigger::KeysSealed, None),
            (New, Trigger::IntegrityFailed, None),
            (Initialized, Trigger::KeysSealed, Some(Sealed)),
            (Initialized, Trigger::GenerationFailed, Some(New)),
            (Sealed, Trigger::IntegrityFailed, Some(Compromised)),
            (Sealed, Trigger::KeysGenerated, None),
            (Compromised, Trigger::IntegrityFailed, None),
            (Compromised, Trigger::KeysSealed, None),
            (Compromised, Trigger::KeysGenerated, None),
        ];

        for (state, trigger, expected) in tests {
            assert_eq!(
                state.next(*trigger),
                *expected,
                "{state} --{trigger}--> {expected:?}"
            );
        }
    }

    #[test]
    fn factory_reset_from_any() {
        for s in DeviceState::iter() {
            assert_eq!(s.next(Trigger::FactoryReset), Some(DeviceState::New));
        }
    }

    /// Only factory reset leaves the compromised state
    #[test]
    fn compromised_is_terminal() {
        for t in Trigger::iter() {
            let next = DeviceState::Compromised.next(t);
            match t {
                Trigger::FactoryReset => assert_eq!(next, Some(DeviceState::New)),
                _ => assert_eq!(next, None, "{t} left compromised state"),
            }
        }
    }

    #[test]
    fn initialized_not_persisted() {
        assert_eq!(DeviceState::Initialized.persisted(), DeviceState::New);
        assert_eq!(DeviceState::Sealed.persisted(), DeviceState::Sealed);
    }
}
