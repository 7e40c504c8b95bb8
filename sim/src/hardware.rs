// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated secure element, tamper loop and clock

use std::{
    cell::Cell,
    fs,
    path::Path,
    rc::Rc,
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512, Sha512_256};

use bearer_core::{
    consts::{SE_KEYGEN_TIMEOUT_MS, SE_POLL_INTERVAL_MS, SE_TIMEOUT_MS},
    error::SecureElementError,
    helpers::{address_from_str, poll_until, push_hex},
    platform::{Clock, Platform},
    secure_element::{Keypair, SealValue, SecureElement, Signature},
};

/// Persisted simulated hardware state
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct HardwareState {
    /// Secure element device secret (never leaves the element)
    #[serde(with = "hex::serde")]
    pub device_secret: [u8; 32],

    /// Key slot holding the current wallet key
    pub key_slot: Option<u32>,

    /// Next free key slot
    pub next_slot: u32,

    /// Enclosure tamper loop continuity
    pub circuit_intact: bool,

    /// Secure element tamper register set
    pub se_tampered: bool,

    /// Secure element stops responding
    pub se_wedged: bool,

    /// Secure element response latency
    pub se_latency_ms: u32,

    /// Secure element key generation latency
    pub se_keygen_latency_ms: u32,
}

impl HardwareState {
    /// Create fresh hardware with a random device secret
    pub fn new() -> Self {
        Self {
            device_secret: rand::random(),
            key_slot: None,
            next_slot: 0,
            circuit_intact: true,
            se_tampered: false,
            se_wedged: false,
            se_latency_ms: 20,
            se_keygen_latency_ms: 1_500,
        }
    }

    /// Load hardware state, creating fresh hardware if none exists
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("creating hardware state at '{}'", path.display());
            return Ok(Self::new());
        }

        let s = fs::read_to_string(path)?;
        let v = serde_json::from_str(&s)?;

        Ok(v)
    }

    /// Write hardware state
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let s = serde_json::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }
}

impl Default for HardwareState {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared simulated clock, advanced only by delays
#[derive(Clone, Debug)]
pub struct SimClock(Rc<Cell<u32>>);

impl SimClock {
    /// Create a clock starting at the current wall time (ms, wrapping)
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u32)
            .unwrap_or(0);

        Self::starting_at(now)
    }

    pub fn starting_at(ms: u32) -> Self {
        Self(Rc::new(Cell::new(ms)))
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }
}

/// Simulated enclosure tamper loop
pub struct SimPlatform {
    clock: SimClock,
    circuit_intact: bool,
}

impl SimPlatform {
    pub fn new(clock: SimClock, circuit_intact: bool) -> Self {
        Self {
            clock,
            circuit_intact,
        }
    }

    pub fn circuit_intact(&self) -> bool {
        self.circuit_intact
    }

    pub fn set_circuit(&mut self, intact: bool) {
        self.circuit_intact = intact;
    }
}

impl Clock for SimPlatform {
    fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms)
    }
}

impl Platform for SimPlatform {
    fn tamper_loop_intact(&mut self) -> bool {
        self.circuit_intact
    }
}

/// Simulated secure element with response latency.
///
/// Keys are derived from the device secret and a key slot index, so the
/// element state persists as a [HardwareState].
pub struct SimSecureElement {
    hw: HardwareState,
    clock: SimClock,
}

impl SimSecureElement {
    pub fn new(hw: HardwareState, clock: SimClock) -> Self {
        Self { hw, clock }
    }

    /// Current hardware state
    pub fn hardware(&self) -> &HardwareState {
        &self.hw
    }

    /// Mutable hardware state
    pub fn hardware_mut(&mut self) -> &mut HardwareState {
        &mut self.hw
    }

    /// Issue a request and poll for the response, bounded by `timeout_ms`
    fn transact(&mut self, latency_ms: u32, timeout_ms: u32) -> Result<(), SecureElementError> {
        let wedged = self.hw.se_wedged;
        let ready_at = self.clock.now_ms().wrapping_add(latency_ms);
        let probe = self.clock.clone();

        poll_until(&mut self.clock, SE_POLL_INTERVAL_MS, timeout_ms, || {
            let ready = probe.now_ms().wrapping_sub(ready_at) as i32 >= 0;
            (!wedged && ready).then_some(())
        })
        .map_err(|_| {
            warn!("secure element response timeout ({} ms)", timeout_ms);
            SecureElementError::Timeout
        })
    }

    fn slot_key(&self, slot: u32) -> [u8; 32] {
        let mut h = Sha512_256::new();
        h.update(self.hw.device_secret);
        h.update(b"slot");
        h.update(slot.to_le_bytes());
        h.finalize().into()
    }
}

impl SecureElement for SimSecureElement {
    fn configure_tamper_detection(&mut self) -> Result<(), SecureElementError> {
        self.transact(self.hw.se_latency_ms, SE_TIMEOUT_MS)?;

        debug!("secure element tamper detection enabled");

        Ok(())
    }

    fn generate_keypair(&mut self) -> Result<Keypair, SecureElementError> {
        self.transact(self.hw.se_keygen_latency_ms, SE_KEYGEN_TIMEOUT_MS)?;

        let slot = self.hw.next_slot;
        let private_key = self.slot_key(slot);

        let p = Sha512_256::digest(private_key);
        let mut public_key = [0u8; 33];
        public_key[0] = 0x02 | (p[31] & 0x01);
        public_key[1..].copy_from_slice(&p);

        let d = Sha512_256::digest(public_key);
        let mut address = address_from_str("bc1q").ok_or(SecureElementError::ProtocolError)?;
        push_hex(&mut address, &d[..19]).ok_or(SecureElementError::ProtocolError)?;

        self.hw.key_slot = Some(slot);
        self.hw.next_slot = slot.wrapping_add(1);

        debug!("generated key in slot {}", slot);

        Ok(Keypair {
            private_key,
            public_key,
            address,
        })
    }

    fn sign(&mut self, hash: &[u8; 32]) -> Result<Signature, SecureElementError> {
        self.transact(self.hw.se_latency_ms, SE_TIMEOUT_MS)?;

        let slot = self.hw.key_slot.ok_or(SecureElementError::ProtocolError)?;

        let mut h = Sha512::new();
        h.update(self.slot_key(slot));
        h.update(hash);

        Ok(h.finalize().into())
    }

    fn tamper_flag(&mut self) -> Result<bool, SecureElementError> {
        self.transact(self.hw.se_latency_ms, SE_TIMEOUT_MS)?;

        Ok(!self.hw.se_tampered)
    }

    fn compute_seal(&mut self, material: &[u8; 32]) -> Result<SealValue, SecureElementError> {
        self.transact(self.hw.se_latency_ms, SE_TIMEOUT_MS)?;

        let mut h = Sha512_256::new();
        h.update(self.hw.device_secret);
        h.update(b"seal");
        h.update(material);

        Ok(h.finalize().into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn se(hw: HardwareState) -> (SimSecureElement, SimClock) {
        let clock = SimClock::starting_at(1_000);
        (SimSecureElement::new(hw, clock.clone()), clock)
    }

    #[test]
    fn latency() {
        let (mut se, clock) = se(HardwareState::new());

        assert_eq!(se.tamper_flag(), Ok(true));
        assert_eq!(clock.now_ms(), 1_020);

        se.generate_keypair().unwrap();
        assert_eq!(clock.now_ms(), 2_520);
    }

    #[test]
    fn wedged_timeout() {
        let mut hw = HardwareState::new();
        hw.se_wedged = true;
        let (mut se, clock) = se(hw);

        assert_eq!(se.tamper_flag(), Err(SecureElementError::Timeout));
        assert_eq!(clock.now_ms(), 1_000 + SE_TIMEOUT_MS);

        assert_eq!(
            se.generate_keypair().map(|_| ()),
            Err(SecureElementError::Timeout)
        );
        assert_eq!(se.hardware().key_slot, None);
    }

    #[test]
    fn slow_response_timeout() {
        let mut hw = HardwareState::new();
        hw.se_latency_ms = SE_TIMEOUT_MS + 100;
        let (mut se, _clock) = se(hw);

        assert_eq!(
            se.compute_seal(&[0u8; 32]),
            Err(SecureElementError::Timeout)
        );
    }

    /// Signing key survives a restart via the persisted slot
    #[test]
    fn key_slot_persists() {
        let (mut a, _clock) = se(HardwareState::new());

        let kp = a.generate_keypair().unwrap();
        let sig = a.sign(&[0x11; 32]).unwrap();

        let (mut b, _clock) = se(a.hardware().clone());
        assert_eq!(b.sign(&[0x11; 32]), Ok(sig));

        // Fresh slot for the next key
        let kp2 = b.generate_keypair().unwrap();
        assert_ne!(kp.public_key, kp2.public_key);
        assert_eq!(kp.address.len(), 42);
    }

    #[test]
    fn sign_without_key() {
        let (mut se, _clock) = se(HardwareState::new());

        assert_eq!(se.sign(&[0u8; 32]), Err(SecureElementError::ProtocolError));
    }

    #[test]
    fn hardware_state_file() {
        let d = tempfile::tempdir().unwrap();
        let p = d.path().join("hardware.json");

        let hw = HardwareState::load_or_create(&p).unwrap();
        hw.save(&p).unwrap();

        assert_eq!(HardwareState::load_or_create(&p).unwrap(), hw);
    }
}
