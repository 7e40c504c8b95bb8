// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [Engine] owns all key custody state for a bearer wallet device.
//!
//! This handles [Event] inputs and returns [Output] responses to the caller,
//! and exposes each operation directly for firmware collaborators
//! (LED, USB and button handlers).
//!
//! Execution is single threaded, each operation runs to completion and
//! blocks on secure element and flash access.

use embedded_storage::nor_flash::NorFlash;
use zeroize::Zeroize;

use crate::{
    custody::KeyCustody,
    error::{StorageError, WalletError},
    platform::Platform,
    seal::SealManager,
    secure_element::{Address, PublicKey, SecureElement, Signature},
    state::{DeviceState, Trigger},
    storage::{RecordKind, RecordStore, StateRecord, WalletKeyRecord},
    tamper::{Signals, TamperMonitor, TamperStatus},
};

mod event;
pub use event::Event;

mod output;
pub use output::Output;

/// Read-only wallet status snapshot, contains no secret material
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WalletStatus {
    /// Key record present
    pub initialized: bool,
    /// Keys generated and sealed
    pub sealed: bool,
    /// Wallet address (once sealed)
    pub address: Option<Address>,
    /// Most recent integrity verdict
    pub tamper_intact: bool,
    /// Cumulative failed integrity checks
    pub tamper_count: u32,
    /// Private key has been disclosed
    pub keys_revealed: bool,
}

/// [Engine] provides hardware-independent key custody for bearer wallets
pub struct Engine<SE: SecureElement, F: NorFlash, P: Platform> {
    state: DeviceState,
    monitor: TamperMonitor,
    custody: KeyCustody,

    se: SE,
    store: RecordStore<F>,
    platform: P,
}

impl<SE: SecureElement, F: NorFlash, P: Platform> Engine<SE, F, P> {
    /// Create a new engine using the provided secure element, flash and
    /// platform drivers. Call [Engine::boot] to load persisted state.
    pub fn new(se: SE, flash: F, platform: P) -> Self {
        Self::with_store(se, RecordStore::new(flash), platform)
    }

    /// Create a new engine with a pre-configured [RecordStore]
    pub fn with_store(se: SE, store: RecordStore<F>, platform: P) -> Self {
        Self {
            state: DeviceState::New,
            monitor: TamperMonitor::new(0),
            custody: KeyCustody::new(),
            se,
            store,
            platform,
        }
    }

    /// Load persisted state, configure tamper detection and run the
    /// boot integrity check for devices holding sealed keys
    pub fn boot(&mut self) -> TamperStatus {
        let (state, tamper_count) = match self.store.read_record::<StateRecord>() {
            Ok(r) => (r.state, r.tamper_count),
            Err(_e) => {
                #[cfg(feature = "log")]
                log::warn!("no valid state record ({:?}), defaulting to new", _e);

                (DeviceState::New, 0)
            }
        };

        self.state = state;
        self.monitor = TamperMonitor::new(tamper_count);
        self.custody.clear();

        // The key record bounds the state from below when the state record
        // is lost or lags behind (power lost during a state write)
        if let Some(recovered) = self.recover_state() {
            #[cfg(feature = "log")]
            log::warn!(
                "state record ({}) behind key record, restoring {}",
                self.state,
                recovered
            );

            self.state = recovered;
            self.persist_state_logged();
        }

        if let Err(_e) = self.se.configure_tamper_detection() {
            #[cfg(feature = "log")]
            log::warn!("secure element tamper configuration failed: {:?}", _e);
        }

        #[cfg(feature = "log")]
        log::info!("boot state: {} (tamper count: {})", self.state, tamper_count);

        match self.state.has_keys() {
            true => self.check_integrity(),
            false => self.monitor.status(),
        }
    }

    /// Handle incoming events
    pub fn update(&mut self, evt: &Event) -> Result<Output, WalletError> {
        #[cfg(feature = "log")]
        log::debug!("event: {}", evt);

        let r = match evt {
            Event::None => Output::None,
            Event::GetStatus => Output::Status(self.wallet_status_summary()),
            Event::GetState => Output::State(self.current_device_state()),
            Event::GetTamperStatus => Output::Tamper(self.current_tamper_status()),
            Event::CheckIntegrity => Output::Tamper(self.check_integrity()),
            Event::GenerateKeys => Output::Address(self.generate_new_keys()?),
            Event::GetAddress => Output::Address(self.get_address()?),
            Event::GetPublicKey => Output::PublicKey(self.export_public_key()?),
            Event::RevealPrivateKey => Output::PrivateKey(self.reveal_private_key()?),
            Event::SignHash { hash } => Output::Signature(self.sign_hash(hash)?),
            Event::FactoryReset => {
                self.factory_reset()?;
                Output::State(self.state)
            }
        };

        Ok(r)
    }

    /// Sample all integrity signals and update the verdict.
    ///
    /// A failed check increments and persists the tamper count, and on a
    /// sealed device advances to [DeviceState::Compromised] and discloses
    /// the keys. Once compromised every check fails.
    pub fn check_integrity(&mut self) -> TamperStatus {
        let signals = TamperMonitor::sample(&mut self.platform, &mut self.se, &mut self.store);

        let latched = self.state == DeviceState::Compromised;
        let now = self.platform.now_ms();
        let status = self.monitor.record(signals, latched, now);

        if status.is_intact {
            return status;
        }

        // Advance in memory regardless of persistence, failing closed
        let prev = self.state;
        if let Some(next) = self.state.next(Trigger::IntegrityFailed) {
            self.state = next;
        }

        self.persist_state_logged();

        if prev != self.state {
            #[cfg(feature = "log")]
            log::info!("device compromised");

            match self.custody.disclose(&mut self.store) {
                Ok(mut k) => k.zeroize(),
                Err(_e) => {
                    #[cfg(feature = "log")]
                    log::error!("failed to record key disclosure: {:?}", _e);
                }
            }
        }

        status
    }

    /// Generate a new wallet keypair, seal the device and
    /// transition to [DeviceState::Sealed]
    pub fn generate_new_keys(&mut self) -> Result<Address, WalletError> {
        if self.state != DeviceState::New {
            return Err(WalletError::InvalidState);
        }

        // Sealing is a one-way commitment per key generation
        match self.store.read_record::<WalletKeyRecord>() {
            Ok(r) if r.is_sealed => return Err(WalletError::InvalidState),
            Ok(_) => (),
            Err(e) if e.is_absent() => (),
            Err(e) => return Err(e.into()),
        }

        let r = self.generate_and_seal();

        if let Err(_e) = &r {
            #[cfg(feature = "log")]
            log::error!("key generation failed: {:?}", _e);

            self.state = self
                .state
                .next(Trigger::GenerationFailed)
                .unwrap_or(DeviceState::New);
            self.custody.clear();
        }

        r
    }

    fn generate_and_seal(&mut self) -> Result<Address, WalletError> {
        let address = self.custody.generate(&mut self.se, &mut self.store)?;

        self.state = self
            .state
            .next(Trigger::KeysGenerated)
            .ok_or(WalletError::InvalidState)?;

        SealManager::new(&mut self.store, &mut self.se).create_seal()?;
        self.custody.mark_sealed(&mut self.store)?;

        // Persist before reporting sealed
        let next = self
            .state
            .next(Trigger::KeysSealed)
            .ok_or(WalletError::InvalidState)?;
        let r = StateRecord::new(
            next,
            self.monitor.status().tamper_count,
            self.platform.now_ms(),
        );
        if let Err(e) = self.store.write_record(&r) {
            // Key record must not claim sealed unless the state record does
            if let Err(_e) = self.custody.unmark_sealed(&mut self.store) {
                #[cfg(feature = "log")]
                log::error!("failed to roll back sealed key record: {:?}", _e);
            }

            return Err(e.into());
        }

        self.state = next;

        #[cfg(feature = "log")]
        log::info!("device sealed, address: {}", address);

        Ok(address)
    }

    /// Fetch the wallet address
    pub fn get_address(&mut self) -> Result<Address, WalletError> {
        Ok(self.sealed_keys()?.address.clone())
    }

    /// Fetch the compressed wallet public key, permitted in any
    /// tamper state once sealed
    pub fn export_public_key(&mut self) -> Result<PublicKey, WalletError> {
        Ok(self.sealed_keys()?.public_key)
    }

    /// Disclose the wallet private key.
    ///
    /// Always runs a fresh integrity check, failing with
    /// [WalletError::StillSealed] while the device is intact.
    /// Once disclosed, repeat calls return the same key.
    pub fn reveal_private_key(&mut self) -> Result<[u8; 32], WalletError> {
        let status = self.check_integrity();
        if status.is_intact {
            #[cfg(feature = "log")]
            log::warn!("private key requested on intact device");

            return Err(WalletError::StillSealed);
        }

        self.custody.disclose(&mut self.store)
    }

    /// Sign a 32-byte transaction hash with the wallet key
    pub fn sign_hash(&mut self, hash: &[u8; 32]) -> Result<Signature, WalletError> {
        self.sealed_keys()?;

        match self.se.sign(hash) {
            Ok(s) => Ok(s),
            Err(e) => {
                #[cfg(feature = "log")]
                log::error!("signing failed: {:?}", e);

                Err(e.into())
            }
        }
    }

    /// Verify the stored seal against the secure element
    pub fn verify_seal(&mut self) -> bool {
        SealManager::new(&mut self.store, &mut self.se).verify_seal()
    }

    /// Fetch the current device lifecycle state
    pub fn current_device_state(&self) -> DeviceState {
        self.state
    }

    /// Fetch the most recent tamper status
    pub fn current_tamper_status(&self) -> TamperStatus {
        self.monitor.status()
    }

    /// Fetch the integrity signals sampled by the most recent check
    pub fn last_signals(&self) -> Option<Signals> {
        self.monitor.last_signals()
    }

    /// Build a status snapshot, loading the key record if required
    pub fn wallet_status_summary(&mut self) -> WalletStatus {
        let tamper = self.monitor.status();
        let has_keys = self.state.has_keys();

        let (initialized, sealed, address, keys_revealed) = match self.custody.load(&mut self.store)
        {
            Ok(r) => {
                let sealed = r.is_sealed && has_keys;
                (
                    true,
                    sealed,
                    sealed.then(|| r.address.clone()),
                    r.keys_revealed,
                )
            }
            Err(_) => (false, false, None, false),
        };

        WalletStatus {
            initialized,
            sealed,
            address,
            tamper_intact: tamper.is_intact,
            tamper_count: tamper.tamper_count,
            keys_revealed,
        }
    }

    /// Erase the key and seal records and return to [DeviceState::New].
    ///
    /// The tamper count is preserved.
    pub fn factory_reset(&mut self) -> Result<(), WalletError> {
        #[cfg(feature = "log")]
        log::info!("factory reset from state: {}", self.state);

        self.custody.clear();

        self.store.erase_record(RecordKind::Keys)?;
        self.store.erase_record(RecordKind::Seal)?;

        self.state = self
            .state
            .next(Trigger::FactoryReset)
            .unwrap_or(DeviceState::New);

        let tamper_count = self.monitor.status().tamper_count;
        self.monitor = TamperMonitor::new(tamper_count);

        self.persist_state()?;

        Ok(())
    }

    /// Access the secure element driver
    pub fn se_mut(&mut self) -> &mut SE {
        &mut self.se
    }

    /// Access the platform driver
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Access the record store
    pub fn store_mut(&mut self) -> &mut RecordStore<F> {
        &mut self.store
    }

    /// Consume the engine, returning the drivers
    pub fn into_inner(self) -> (SE, F, P) {
        (self.se, self.store.into_inner(), self.platform)
    }

    /// Lifecycle state implied by the stored key record, if ahead of the
    /// current state. A sealed record implies at least [DeviceState::Sealed],
    /// a disclosed record implies [DeviceState::Compromised].
    fn recover_state(&mut self) -> Option<DeviceState> {
        let (sealed, revealed) = match self.custody.load(&mut self.store) {
            Ok(r) => (r.is_sealed, r.keys_revealed),
            Err(_) => return None,
        };

        match (self.state, sealed, revealed) {
            (DeviceState::New, true, false) => Some(DeviceState::Sealed),
            (DeviceState::New | DeviceState::Sealed, true, true) => Some(DeviceState::Compromised),
            _ => None,
        }
    }

    /// Fetch the sealed key record, requiring a state holding keys
    fn sealed_keys(&mut self) -> Result<&WalletKeyRecord, WalletError> {
        if !self.state.has_keys() {
            return Err(WalletError::NotInitialized);
        }

        self.custody.sealed(&mut self.store)
    }

    fn persist_state(&mut self) -> Result<(), StorageError> {
        let r = StateRecord::new(
            self.state,
            self.monitor.status().tamper_count,
            self.platform.now_ms(),
        );

        self.store.write_record(&r)
    }

    fn persist_state_logged(&mut self) {
        if let Err(_e) = self.persist_state() {
            #[cfg(feature = "log")]
            log::error!("failed to persist device state: {:?}", _e);
        }
    }
}
