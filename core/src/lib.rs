// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Bearer wallet key custody core
//!
//! This provides a hardware-independent [Engine][engine] managing the wallet
//! key lifecycle for tamper-responsive bearer wallets: the private key is
//! sealed at generation and only disclosed once the device has detected
//! physical tampering.
//!
//! Interactions with the [Engine][engine] are performed via direct calls or
//! [Event][engine::Event]s and [Output][engine::Output]s, with hardware access
//! provided by [SecureElement][secure_element::SecureElement],
//! [NorFlash][embedded_storage::nor_flash::NorFlash] and
//! [Platform][platform::Platform] drivers.
//!
//! ## Lifecycle
//!
//! 1. A [New][state::DeviceState::New] device generates a keypair on the
//!    secure element, persists it, creates a [seal][seal] over it and moves
//!    to [Sealed][state::DeviceState::Sealed]
//! 2. Integrity is checked at boot and on each button press, combining the
//!    enclosure tamper loop, the secure element tamper register and seal
//!    verification (see [tamper])
//! 3. A failed check moves the device to
//!    [Compromised][state::DeviceState::Compromised], after which
//!    [reveal_private_key][engine::Engine::reveal_private_key] returns the
//!    wallet private key to whoever holds the device
//! 4. A factory reset erases keys and seal, returning the device to `New`
//!
//! ## Storage
//!
//! Keys, device state and seal are each stored in a dedicated flash sector,
//! see [storage] for the record format.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod consts;

pub mod control;

pub mod custody;

pub mod engine;

pub mod error;

pub mod helpers;

pub mod platform;

pub mod seal;

pub mod secure_element;

pub mod state;

pub mod storage;

pub mod tamper;

#[cfg(feature = "std")]
pub mod mock;
