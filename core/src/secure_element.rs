// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure element client interface
//!
//! The secure element is an external collaborator providing key generation,
//! signing, a hardware tamper register and device-bound seal computation.
//! Implementations own the transport (I2C framing, response polling) and
//! must bound every wait, see [poll_until][crate::helpers::poll_until].

use core::fmt::Debug;

use zeroize::Zeroize;

use crate::{consts::ADDRESS_LEN, error::SecureElementError};

/// Human readable wallet address
pub type Address = heapless::String<ADDRESS_LEN>;

/// Compressed secp256k1 public key
pub type PublicKey = [u8; 33];

/// Compact signature
pub type Signature = [u8; 64];

/// Device-bound seal value
pub type SealValue = [u8; 32];

/// Freshly generated wallet keypair
#[derive(Clone)]
pub struct Keypair {
    pub private_key: [u8; 32],
    pub public_key: PublicKey,
    pub address: Address,
}

impl Debug for Keypair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Drop for Keypair {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// [`SecureElement`] trait provides the secure element capabilities
/// consumed by the [`Engine`][crate::engine::Engine]
pub trait SecureElement {
    /// Enable tamper detection on the secure element, called once at boot
    fn configure_tamper_detection(&mut self) -> Result<(), SecureElementError> {
        Ok(())
    }

    /// Generate a fresh keypair and derive its address
    fn generate_keypair(&mut self) -> Result<Keypair, SecureElementError>;

    /// Sign a 32-byte hash with the wallet key
    fn sign(&mut self, hash: &[u8; 32]) -> Result<Signature, SecureElementError>;

    /// Read the tamper register, `true` when no tamper event is reported
    fn tamper_flag(&mut self) -> Result<bool, SecureElementError>;

    /// Compute the device-bound seal for the provided key material
    fn compute_seal(&mut self, material: &[u8; 32]) -> Result<SealValue, SecureElementError>;
}

impl<T: SecureElement> SecureElement for &mut T {
    fn configure_tamper_detection(&mut self) -> Result<(), SecureElementError> {
        T::configure_tamper_detection(self)
    }

    fn generate_keypair(&mut self) -> Result<Keypair, SecureElementError> {
        T::generate_keypair(self)
    }

    fn sign(&mut self, hash: &[u8; 32]) -> Result<Signature, SecureElementError> {
        T::sign(self, hash)
    }

    fn tamper_flag(&mut self) -> Result<bool, SecureElementError> {
        T::tamper_flag(self)
    }

    fn compute_seal(&mut self, material: &[u8; 32]) -> Result<SealValue, SecureElementError> {
        T::compute_seal(self, material)
    }
}
