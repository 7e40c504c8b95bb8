// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software secure element and platform drivers for testing

use sha2::{Digest, Sha512, Sha512_256};

use crate::{
    error::SecureElementError,
    helpers::{address_from_str, push_hex},
    platform::{Clock, Platform},
    secure_element::{Keypair, SealValue, SecureElement, Signature},
};

/// Deterministic software secure element
#[derive(Clone, Debug)]
pub struct MockSecureElement {
    secret: [u8; 32],
    counter: u32,
    key: Option<[u8; 32]>,
    tampered: bool,
    unreachable: bool,
    configured: bool,
}

impl MockSecureElement {
    /// Create a secure element with the provided device secret
    pub fn new(secret: [u8; 32]) -> Self {
        Self {
            secret,
            counter: 0,
            key: None,
            tampered: false,
            unreachable: false,
            configured: false,
        }
    }

    /// Set the tamper register
    pub fn set_tampered(&mut self, tampered: bool) {
        self.tampered = tampered;
    }

    /// Fail all requests with [SecureElementError::Unreachable]
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    /// Check whether tamper detection has been configured
    pub fn is_configured(&self) -> bool {
        self.configured
    }

    fn reachable(&self) -> Result<(), SecureElementError> {
        match self.unreachable {
            true => Err(SecureElementError::Unreachable),
            false => Ok(()),
        }
    }
}

impl SecureElement for MockSecureElement {
    fn configure_tamper_detection(&mut self) -> Result<(), SecureElementError> {
        self.reachable()?;
        self.configured = true;
        Ok(())
    }

    fn generate_keypair(&mut self) -> Result<Keypair, SecureElementError> {
        self.reachable()?;

        let mut h = Sha512_256::new();
        h.update(self.secret);
        h.update(b"key");
        h.update(self.counter.to_le_bytes());
        let private_key: [u8; 32] = h.finalize().into();
        self.counter += 1;

        let p = Sha512_256::digest(private_key);
        let mut public_key = [0u8; 33];
        public_key[0] = 0x02 | (p[31] & 0x01);
        public_key[1..].copy_from_slice(&p);

        let d = Sha512_256::digest(public_key);
        let mut address = address_from_str("bc1q").ok_or(SecureElementError::ProtocolError)?;
        push_hex(&mut address, &d[..19]).ok_or(SecureElementError::ProtocolError)?;

        self.key = Some(private_key);

        Ok(Keypair {
            private_key,
            public_key,
            address,
        })
    }

    fn sign(&mut self, hash: &[u8; 32]) -> Result<Signature, SecureElementError> {
        self.reachable()?;

        let key = self.key.ok_or(SecureElementError::ProtocolError)?;

        let mut h = Sha512::new();
        h.update(key);
        h.update(hash);

        Ok(h.finalize().into())
    }

    fn tamper_flag(&mut self) -> Result<bool, SecureElementError> {
        self.reachable()?;
        Ok(!self.tampered)
    }

    fn compute_seal(&mut self, material: &[u8; 32]) -> Result<SealValue, SecureElementError> {
        self.reachable()?;

        let mut h = Sha512_256::new();
        h.update(self.secret);
        h.update(material);

        Ok(h.finalize().into())
    }
}

/// Platform with a manual clock and tamper loop
#[derive(Clone, Debug)]
pub struct MockPlatform {
    circuit: bool,
    now: u32,
}

impl MockPlatform {
    /// Create a platform with an intact tamper loop
    pub fn new() -> Self {
        Self {
            circuit: true,
            now: 0,
        }
    }

    /// Set tamper loop continuity
    pub fn set_circuit(&mut self, intact: bool) {
        self.circuit = intact;
    }

    /// Advance the clock
    pub fn advance(&mut self, ms: u32) {
        self.now = self.now.wrapping_add(ms);
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockPlatform {
    fn now_ms(&self) -> u32 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(ms)
    }
}

impl Platform for MockPlatform {
    fn tamper_loop_intact(&mut self) -> bool {
        self.circuit
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keypairs_distinct() {
        let mut se = MockSecureElement::new([7; 32]);

        let a = se.generate_keypair().unwrap();
        let b = se.generate_keypair().unwrap();

        assert_ne!(a.private_key, b.private_key);
        assert_eq!(a.address.len(), 42);
        assert!(a.address.starts_with("bc1q"));
    }

    #[test]
    fn seal_device_bound() {
        let mut a = MockSecureElement::new([1; 32]);
        let mut b = MockSecureElement::new([2; 32]);

        let m = [0x33; 32];
        assert_eq!(a.compute_seal(&m), a.compute_seal(&m));
        assert_ne!(a.compute_seal(&m), b.compute_seal(&m));
    }
}
