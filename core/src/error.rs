// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Error kinds for each layer of the custody engine.
//!
//! Lower layers ([StorageError], [SecureElementError]) carry detail that is
//! folded into the coarse [SealError] / [WalletError] categories reported
//! upward. The `#[repr(u8)]` values are stable and may be reported as-is.

/// Persistent record store errors
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum StorageError {
    /// No record with the expected magic in this sector
    #[cfg_attr(feature = "thiserror", error("record not found"))]
    NotFound = 0x00,

    /// Record checksum mismatch
    #[cfg_attr(feature = "thiserror", error("record checksum mismatch"))]
    Corrupt = 0x01,

    /// Programmed bytes did not match on read-back
    #[cfg_attr(feature = "thiserror", error("write verification failed"))]
    WriteVerifyFailed = 0x02,

    /// Record envelope valid but payload could not be decoded
    #[cfg_attr(feature = "thiserror", error("invalid record payload"))]
    InvalidRecord = 0x03,

    /// Flash driver reported an erase / program / read failure
    #[cfg_attr(feature = "thiserror", error("flash operation failed"))]
    Flash = 0x04,
}

impl StorageError {
    /// Check whether this error means "no valid record", in which case
    /// callers apply their safe default
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound | StorageError::Corrupt | StorageError::InvalidRecord
        )
    }
}

impl From<encdec::Error> for StorageError {
    fn from(_: encdec::Error) -> Self {
        StorageError::InvalidRecord
    }
}

/// Secure element client errors
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum SecureElementError {
    /// Bus error or no response from the device
    #[cfg_attr(feature = "thiserror", error("secure element unreachable"))]
    Unreachable = 0x10,

    /// Malformed or failed response
    #[cfg_attr(feature = "thiserror", error("secure element protocol error"))]
    ProtocolError = 0x11,

    /// Response not ready within the polling bound
    #[cfg_attr(feature = "thiserror", error("secure element timeout"))]
    Timeout = 0x12,
}

/// Seal manager errors
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum SealError {
    /// Seal computation failed on the secure element
    #[cfg_attr(feature = "thiserror", error("secure element failure"))]
    SecureElementFailure = 0x20,

    /// Seal or key record could not be read or written
    #[cfg_attr(feature = "thiserror", error("storage failure"))]
    StorageFailure = 0x21,
}

impl From<StorageError> for SealError {
    fn from(_: StorageError) -> Self {
        SealError::StorageFailure
    }
}

impl From<SecureElementError> for SealError {
    fn from(_: SecureElementError) -> Self {
        SealError::SecureElementFailure
    }
}

/// Wallet / key custody errors, the coarse category reported to
/// collaborators via [Engine][crate::engine::Engine] operations
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum WalletError {
    /// No sealed key record exists
    #[cfg_attr(feature = "thiserror", error("wallet not initialised"))]
    NotInitialized = 0x30,

    /// Device integrity intact, private key not accessible
    #[cfg_attr(feature = "thiserror", error("device still sealed"))]
    StillSealed = 0x31,

    /// Secure element operation failed
    #[cfg_attr(feature = "thiserror", error("secure element failure"))]
    SecureElementFailure = 0x32,

    /// Persistent storage operation failed
    #[cfg_attr(feature = "thiserror", error("storage failure"))]
    StorageFailure = 0x33,

    /// Operation not permitted in the current device state
    #[cfg_attr(feature = "thiserror", error("invalid device state"))]
    InvalidState = 0x34,
}

impl From<StorageError> for WalletError {
    fn from(_: StorageError) -> Self {
        WalletError::StorageFailure
    }
}

impl From<SecureElementError> for WalletError {
    fn from(_: SecureElementError) -> Self {
        WalletError::SecureElementFailure
    }
}

impl From<SealError> for WalletError {
    fn from(e: SealError) -> Self {
        match e {
            SealError::SecureElementFailure => WalletError::SecureElementFailure,
            SealError::StorageFailure => WalletError::StorageFailure,
        }
    }
}
