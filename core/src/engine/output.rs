// Copyright (c) 2022-2023 The MobileCoin Foundation

use crate::{
    secure_element::{Address, PublicKey, Signature},
    state::DeviceState,
    tamper::TamperStatus,
};

use super::WalletStatus;

/// [`Engine`][super::Engine] outputs (in response to events)
#[derive(Clone, PartialEq, Debug)]
pub enum Output {
    None,

    /// Wallet status summary
    Status(WalletStatus),

    /// Device lifecycle state
    State(DeviceState),

    /// Tamper status
    Tamper(TamperStatus),

    /// Wallet address
    Address(Address),

    /// Compressed wallet public key
    PublicKey(PublicKey),

    /// Disclosed private key
    PrivateKey([u8; 32]),

    /// Transaction hash signature
    Signature(Signature),
}
