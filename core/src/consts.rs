// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Engine constants

/// Offset of the record area from the start of flash (256KiB, above firmware)
pub const STORAGE_BASE: u32 = 256 * 1024;

/// Magic tag for wallet key records
pub const KEYS_MAGIC: u32 = 0xB7C1_2345;

/// Magic tag for device state records
pub const STATE_MAGIC: u32 = 0xDE71_2345;

/// Magic tag for seal records
pub const SEAL_MAGIC: u32 = 0x5EA1_1234;

/// Maximum address string length (bech32 P2WPKH)
pub const ADDRESS_LEN: usize = 42;

/// Upper bound for a secure element response
pub const SE_TIMEOUT_MS: u32 = 1_000;

/// Upper bound for secure element key generation (can take seconds)
pub const SE_KEYGEN_TIMEOUT_MS: u32 = 10_000;

/// Secure element response polling interval
pub const SE_POLL_INTERVAL_MS: u32 = 10;

/// Boot mode press duration to enter mass storage
pub const MASS_STORAGE_PRESS_MS: u32 = 1_000;

/// Boot mode press duration to trigger a factory reset
pub const FACTORY_RESET_PRESS_MS: u32 = 5_000;

/// Button release polling interval
pub const BUTTON_POLL_INTERVAL_MS: u32 = 10;

/// Upper bound for a single button press (stuck button)
pub const BUTTON_RELEASE_TIMEOUT_MS: u32 = 30_000;
