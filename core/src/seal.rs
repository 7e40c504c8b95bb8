// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Cryptographic seal manager
//!
//! The seal binds the wallet keypair to the secure element: the stored seal
//! value is computed by the secure element over a digest of the public key
//! and address, and cannot be reproduced without the element's secret.
//! Verification recomputes the value and compares it with the stored record.

use embedded_storage::nor_flash::NorFlash;
use sha2::{Digest, Sha512_256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::{
    error::SealError,
    secure_element::SecureElement,
    storage::{RecordStore, SealRecord, WalletKeyRecord},
};

/// Compute seal material (the secure element input) for a key record
pub fn seal_material(keys: &WalletKeyRecord) -> [u8; 32] {
    let mut h = Sha512_256::new();
    h.update(b"bearer-seal");
    h.update(keys.public_key);
    h.update(keys.address.as_bytes());

    h.finalize().into()
}

/// [`SealManager`] creates and verifies the device seal
pub struct SealManager<'a, F: NorFlash, SE: SecureElement> {
    store: &'a mut RecordStore<F>,
    se: &'a mut SE,
}

impl<'a, F: NorFlash, SE: SecureElement> SealManager<'a, F, SE> {
    pub fn new(store: &'a mut RecordStore<F>, se: &'a mut SE) -> Self {
        Self { store, se }
    }

    /// Compute a seal over the stored key record and persist it.
    ///
    /// The seal value is computed before storage is touched, so a secure
    /// element failure leaves any existing seal record in place.
    pub fn create_seal(&mut self) -> Result<(), SealError> {
        let keys = self.store.read_record::<WalletKeyRecord>()?;

        let mut material = seal_material(&keys);
        let r = self.se.compute_seal(&material);
        material.zeroize();

        let seal = match r {
            Ok(v) => v,
            Err(e) => {
                #[cfg(feature = "log")]
                log::error!("seal computation failed: {:?}", e);

                return Err(e.into());
            }
        };

        self.store.write_record(&SealRecord::new(seal))?;

        #[cfg(feature = "log")]
        log::info!("seal created");

        Ok(())
    }

    /// Verify the stored seal against a fresh computation.
    ///
    /// Fails closed: missing or invalid key or seal records, and any secure
    /// element error, report `false`.
    pub fn verify_seal(&mut self) -> bool {
        let stored = match self.store.read_record::<SealRecord>() {
            Ok(v) => v,
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("seal record unavailable: {:?}", _e);

                return false;
            }
        };

        let keys = match self.store.read_record::<WalletKeyRecord>() {
            Ok(v) => v,
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("key record unavailable for seal check: {:?}", _e);

                return false;
            }
        };

        let mut material = seal_material(&keys);
        let r = self.se.compute_seal(&material);
        material.zeroize();

        let expected = match r {
            Ok(v) => v,
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("seal recomputation failed: {:?}", _e);

                return false;
            }
        };

        let ok: bool = stored.seal.ct_eq(&expected).into();

        if !ok {
            #[cfg(feature = "log")]
            log::warn!("seal mismatch");
        }

        ok
    }
}
