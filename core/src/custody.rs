// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Key custody controller
//!
//! [KeyCustody] holds the resident copy of the [WalletKeyRecord] and performs
//! every mutation of the persisted key record. Disclosure gating on the
//! integrity verdict is the responsibility of the [Engine][crate::engine::Engine].

use embedded_storage::nor_flash::NorFlash;

use crate::{
    error::{StorageError, WalletError},
    secure_element::{Address, SecureElement},
    storage::{RecordStore, WalletKeyRecord},
};

/// Resident wallet key record
#[derive(Default)]
pub struct KeyCustody {
    resident: Option<WalletKeyRecord>,
}

fn wallet_error(e: StorageError) -> WalletError {
    match e.is_absent() {
        true => WalletError::NotInitialized,
        false => WalletError::StorageFailure,
    }
}

impl KeyCustody {
    pub fn new() -> Self {
        Self { resident: None }
    }

    /// Drop (and zeroize) the resident key record
    pub fn clear(&mut self) {
        self.resident = None;
    }

    /// Check whether a key record is resident
    #[cfg(test)]
    pub(crate) fn is_resident(&self) -> bool {
        self.resident.is_some()
    }

    /// Fetch the key record, loading from storage if not resident
    pub fn load<F: NorFlash>(
        &mut self,
        store: &mut RecordStore<F>,
    ) -> Result<&WalletKeyRecord, StorageError> {
        if self.resident.is_none() {
            let r = store.read_record::<WalletKeyRecord>()?;
            self.resident = Some(r);
        }

        self.resident.as_ref().ok_or(StorageError::NotFound)
    }

    /// Fetch the key record, failing with [WalletError::NotInitialized]
    /// unless a sealed record exists
    pub fn sealed<F: NorFlash>(
        &mut self,
        store: &mut RecordStore<F>,
    ) -> Result<&WalletKeyRecord, WalletError> {
        let r = self.load(store).map_err(wallet_error)?;

        if !r.is_sealed {
            return Err(WalletError::NotInitialized);
        }

        Ok(r)
    }

    /// Generate a new keypair via the secure element and persist an
    /// unsealed key record, replacing any existing record
    pub fn generate<F: NorFlash, SE: SecureElement>(
        &mut self,
        se: &mut SE,
        store: &mut RecordStore<F>,
    ) -> Result<Address, WalletError> {
        self.clear();

        let kp = match se.generate_keypair() {
            Ok(v) => v,
            Err(e) => {
                #[cfg(feature = "log")]
                log::error!("key generation failed: {:?}", e);

                return Err(e.into());
            }
        };

        let r = WalletKeyRecord {
            private_key: kp.private_key,
            public_key: kp.public_key,
            address: kp.address.clone(),
            is_sealed: false,
            keys_revealed: false,
        };

        store.write_record(&r)?;

        #[cfg(feature = "log")]
        log::info!("generated wallet keys, address: {}", r.address);

        let address = r.address.clone();
        self.resident = Some(r);

        Ok(address)
    }

    /// Mark the stored key record as sealed
    pub fn mark_sealed<F: NorFlash>(
        &mut self,
        store: &mut RecordStore<F>,
    ) -> Result<(), WalletError> {
        self.set_sealed(store, true)
    }

    /// Clear the sealed flag on the stored key record, rolling back
    /// a key generation that failed after sealing
    pub fn unmark_sealed<F: NorFlash>(
        &mut self,
        store: &mut RecordStore<F>,
    ) -> Result<(), WalletError> {
        self.set_sealed(store, false)
    }

    fn set_sealed<F: NorFlash>(
        &mut self,
        store: &mut RecordStore<F>,
        sealed: bool,
    ) -> Result<(), WalletError> {
        let mut r = self.load(store).map_err(wallet_error)?.clone();
        if r.is_sealed == sealed {
            return Ok(());
        }

        r.is_sealed = sealed;
        store.write_record(&r)?;

        self.resident = Some(r);

        Ok(())
    }

    /// Copy out the private key, marking the stored record as revealed.
    ///
    /// Repeat calls return the same key without rewriting the record.
    pub fn disclose<F: NorFlash>(
        &mut self,
        store: &mut RecordStore<F>,
    ) -> Result<[u8; 32], WalletError> {
        let r = self.sealed(store)?;
        if r.keys_revealed {
            return Ok(r.private_key);
        }

        let mut r = r.clone();
        r.keys_revealed = true;
        store.write_record(&r)?;

        #[cfg(feature = "log")]
        log::info!("private key disclosed");

        let private_key = r.private_key;
        self.resident = Some(r);

        Ok(private_key)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{mock::MockSecureElement, storage::MemFlash};

    fn setup() -> (KeyCustody, MockSecureElement, RecordStore<MemFlash>) {
        (
            KeyCustody::new(),
            MockSecureElement::new([0x01; 32]),
            RecordStore::new(MemFlash::new()),
        )
    }

    #[test]
    fn generate_unsealed() {
        let (mut c, mut se, mut store) = setup();

        let a = c.generate(&mut se, &mut store).unwrap();
        assert!(a.starts_with("bc1q"));

        // Resident but not sealed
        assert!(c.is_resident());
        assert_eq!(c.sealed(&mut store).map(|_| ()), Err(WalletError::NotInitialized));

        let stored = store.read_record::<WalletKeyRecord>().unwrap();
        assert_eq!(stored.address, a);
        assert!(!stored.is_sealed);
    }

    #[test]
    fn lazy_load() {
        let (mut c, mut se, mut store) = setup();

        let a = c.generate(&mut se, &mut store).unwrap();
        c.mark_sealed(&mut store).unwrap();

        let mut c = KeyCustody::new();
        assert!(!c.is_resident());
        assert_eq!(c.sealed(&mut store).unwrap().address, a);
        assert!(c.is_resident());
    }

    #[test]
    fn missing_record() {
        let (mut c, _se, mut store) = setup();

        assert_eq!(c.load(&mut store).map(|_| ()), Err(StorageError::NotFound));
        assert_eq!(c.sealed(&mut store).map(|_| ()), Err(WalletError::NotInitialized));
        assert_eq!(c.disclose(&mut store), Err(WalletError::NotInitialized));
    }

    #[test]
    fn disclose_marks_revealed() {
        let (mut c, mut se, mut store) = setup();

        c.generate(&mut se, &mut store).unwrap();
        c.mark_sealed(&mut store).unwrap();

        let k1 = c.disclose(&mut store).unwrap();
        assert!(store.read_record::<WalletKeyRecord>().unwrap().keys_revealed);

        // Idempotent, including after reload
        c.clear();
        let k2 = c.disclose(&mut store).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn disclose_write_failure() {
        let (mut c, mut se, mut store) = setup();

        c.generate(&mut se, &mut store).unwrap();
        c.mark_sealed(&mut store).unwrap();

        store.flash_mut().fail_verify_after(0);
        assert_eq!(c.disclose(&mut store), Err(WalletError::StorageFailure));

        // Resident copy unchanged
        assert!(!c.sealed(&mut store).unwrap().keys_revealed);
    }

    #[test]
    fn unmark_sealed() {
        let (mut c, mut se, mut store) = setup();

        c.generate(&mut se, &mut store).unwrap();
        c.mark_sealed(&mut store).unwrap();
        c.unmark_sealed(&mut store).unwrap();

        assert_eq!(c.sealed(&mut store).map(|_| ()), Err(WalletError::NotInitialized));

        c.clear();
        assert!(!store.read_record::<WalletKeyRecord>().unwrap().is_sealed);
    }

    #[test]
    fn keygen_failure() {
        let (mut c, mut se, mut store) = setup();

        se.set_unreachable(true);
        assert_eq!(
            c.generate(&mut se, &mut store),
            Err(WalletError::SecureElementFailure)
        );
        assert!(!c.is_resident());
    }
}
