// Copyright (c) 2022-2023 The MobileCoin Foundation

use strum::Display;

/// [`Engine`][super::Engine] input events, typically translated from
/// button presses or USB commands
#[derive(Clone, PartialEq, Debug, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Event {
    None,

    /// Fetch wallet status summary
    GetStatus,

    /// Fetch device lifecycle state
    GetState,

    /// Fetch the most recent tamper status (no check is performed)
    GetTamperStatus,

    /// Run an integrity check
    CheckIntegrity,

    /// Generate and seal wallet keys
    GenerateKeys,

    /// Fetch wallet address
    GetAddress,

    /// Fetch wallet public key
    GetPublicKey,

    /// Request private key disclosure (checks integrity)
    RevealPrivateKey,

    /// Sign a 32-byte transaction hash
    SignHash { hash: [u8; 32] },

    /// Erase keys and seal, returning to the new state
    FactoryReset,
}
