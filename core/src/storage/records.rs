// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Persisted record payloads

use core::fmt::Debug;

use byteorder::{ByteOrder, LittleEndian};
use encdec::{DecodeOwned, Encode};
use zeroize::Zeroize;

use super::{Record, RecordKind};
use crate::{
    consts::ADDRESS_LEN,
    error::StorageError,
    secure_element::{Address, PublicKey, SealValue},
    state::DeviceState,
};

const FLAG_SEALED: u8 = 1 << 0;
const FLAG_REVEALED: u8 = 1 << 1;

/// Wallet keypair record, the only persisted copy of the private key
#[derive(Clone, PartialEq)]
pub struct WalletKeyRecord {
    pub private_key: [u8; 32],
    pub public_key: PublicKey,
    pub address: Address,
    /// Seal created over this keypair
    pub is_sealed: bool,
    /// Private key disclosed after a failed integrity check
    pub keys_revealed: bool,
}

impl Debug for WalletKeyRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WalletKeyRecord")
            .field("public_key", &self.public_key)
            .field("address", &self.address)
            .field("is_sealed", &self.is_sealed)
            .field("keys_revealed", &self.keys_revealed)
            .finish_non_exhaustive()
    }
}

impl Drop for WalletKeyRecord {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl Record for WalletKeyRecord {
    const KIND: RecordKind = RecordKind::Keys;

    // private key, public key, address length + address, flags
    const LEN: usize = 32 + 33 + 1 + ADDRESS_LEN + 1;
}

impl Encode for WalletKeyRecord {
    type Error = StorageError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(Self::LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        if buff.len() < Self::LEN {
            return Err(StorageError::InvalidRecord);
        }

        let mut i = 0;

        buff[i..][..32].copy_from_slice(&self.private_key);
        i += 32;

        buff[i..][..33].copy_from_slice(&self.public_key);
        i += 33;

        // Address, zero padded
        let a = self.address.as_bytes();
        buff[i] = a.len() as u8;
        i += 1;

        buff[i..][..ADDRESS_LEN].fill(0);
        buff[i..][..a.len()].copy_from_slice(a);
        i += ADDRESS_LEN;

        let mut flags = 0;
        if self.is_sealed {
            flags |= FLAG_SEALED;
        }
        if self.keys_revealed {
            flags |= FLAG_REVEALED;
        }
        buff[i] = flags;
        i += 1;

        Ok(i)
    }
}

impl DecodeOwned for WalletKeyRecord {
    type Output = Self;

    type Error = StorageError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < Self::LEN {
            return Err(StorageError::InvalidRecord);
        }

        let mut r = WalletKeyRecord {
            private_key: [0u8; 32],
            public_key: [0u8; 33],
            address: Address::new(),
            is_sealed: false,
            keys_revealed: false,
        };
        let mut i = 0;

        r.private_key.copy_from_slice(&buff[i..][..32]);
        i += 32;

        r.public_key.copy_from_slice(&buff[i..][..33]);
        i += 33;

        let n = buff[i] as usize;
        i += 1;
        if n > ADDRESS_LEN {
            return Err(StorageError::InvalidRecord);
        }

        let a = core::str::from_utf8(&buff[i..][..n]).map_err(|_| StorageError::InvalidRecord)?;
        r.address
            .push_str(a)
            .map_err(|_| StorageError::InvalidRecord)?;
        i += ADDRESS_LEN;

        let flags = buff[i];
        i += 1;
        r.is_sealed = flags & FLAG_SEALED != 0;
        r.keys_revealed = flags & FLAG_REVEALED != 0;

        Ok((r, i))
    }
}

/// Lifecycle state record
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StateRecord {
    pub state: DeviceState,
    /// Cumulative failed integrity checks, never reset
    pub tamper_count: u32,
    /// Platform time of the last state update (ms, wrapping)
    pub timestamp: u32,
}

impl StateRecord {
    /// Create a new state record, storing the persisted form of `state`
    pub fn new(state: DeviceState, tamper_count: u32, timestamp: u32) -> Self {
        Self {
            state: state.persisted(),
            tamper_count,
            timestamp,
        }
    }
}

impl Record for StateRecord {
    const KIND: RecordKind = RecordKind::State;

    // state + 3 reserved, tamper count, timestamp
    const LEN: usize = 4 + 4 + 4;
}

impl Encode for StateRecord {
    type Error = StorageError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(Self::LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        if buff.len() < Self::LEN {
            return Err(StorageError::InvalidRecord);
        }

        buff[0] = self.state as u8;
        buff[1..4].fill(0);
        LittleEndian::write_u32(&mut buff[4..], self.tamper_count);
        LittleEndian::write_u32(&mut buff[8..], self.timestamp);

        Ok(Self::LEN)
    }
}

impl DecodeOwned for StateRecord {
    type Output = Self;

    type Error = StorageError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < Self::LEN {
            return Err(StorageError::InvalidRecord);
        }

        let state = DeviceState::try_from(buff[0]).map_err(|_| StorageError::InvalidRecord)?;

        Ok((
            Self {
                state,
                tamper_count: LittleEndian::read_u32(&buff[4..]),
                timestamp: LittleEndian::read_u32(&buff[8..]),
            },
            Self::LEN,
        ))
    }
}

/// Seal record, device-bound value computed over the wallet keypair
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SealRecord {
    pub seal: SealValue,
}

impl SealRecord {
    pub fn new(seal: SealValue) -> Self {
        Self { seal }
    }
}

impl Record for SealRecord {
    const KIND: RecordKind = RecordKind::Seal;
    const LEN: usize = 32;
}

impl Encode for SealRecord {
    type Error = StorageError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(Self::LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        if buff.len() < Self::LEN {
            return Err(StorageError::InvalidRecord);
        }

        buff[..Self::LEN].copy_from_slice(&self.seal);

        Ok(Self::LEN)
    }
}

impl DecodeOwned for SealRecord {
    type Output = Self;

    type Error = StorageError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < Self::LEN {
            return Err(StorageError::InvalidRecord);
        }

        let mut seal = [0u8; 32];
        seal.copy_from_slice(&buff[..Self::LEN]);

        Ok((Self { seal }, Self::LEN))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::helpers::address_from_str;

    fn keys() -> WalletKeyRecord {
        WalletKeyRecord {
            private_key: [0x11; 32],
            public_key: [0x02; 33],
            address: address_from_str("bc1qexampleaddress").unwrap(),
            is_sealed: true,
            keys_revealed: false,
        }
    }

    #[test]
    fn key_record_layout() {
        let k = keys();
        let mut buff = [0xAAu8; WalletKeyRecord::LEN];

        assert_eq!(k.encode(&mut buff), Ok(WalletKeyRecord::LEN));

        assert_eq!(&buff[..32], &[0x11; 32]);
        assert_eq!(&buff[32..65], &[0x02; 33]);
        assert_eq!(buff[65] as usize, "bc1qexampleaddress".len());
        assert_eq!(&buff[66..84], b"bc1qexampleaddress");
        assert!(buff[84..108].iter().all(|b| *b == 0));
        assert_eq!(buff[108], FLAG_SEALED);

        let (d, n) = WalletKeyRecord::decode_owned(&buff).unwrap();
        assert_eq!(n, WalletKeyRecord::LEN);
        assert_eq!(d, k);
    }

    #[test]
    fn key_record_invalid_address() {
        let mut buff = [0u8; WalletKeyRecord::LEN];
        keys().encode(&mut buff).unwrap();

        // Length overrun
        buff[65] = ADDRESS_LEN as u8 + 1;
        assert_eq!(
            WalletKeyRecord::decode_owned(&buff).map(|_| ()),
            Err(StorageError::InvalidRecord)
        );

        // Non-UTF8 address
        buff[65] = 2;
        buff[66] = 0xFF;
        buff[67] = 0xFE;
        assert_eq!(
            WalletKeyRecord::decode_owned(&buff).map(|_| ()),
            Err(StorageError::InvalidRecord)
        );
    }

    #[test]
    fn key_record_debug_redacted() {
        let s = format!("{:?}", keys());
        assert!(!s.contains("private_key"));
        assert!(s.contains("bc1qexampleaddress"));
    }

    #[test]
    fn state_record_persists_initialized_as_new() {
        let r = StateRecord::new(DeviceState::Initialized, 3, 99);
        assert_eq!(r.state, DeviceState::New);

        let mut buff = [0u8; StateRecord::LEN];
        r.encode(&mut buff).unwrap();
        assert_eq!(buff, [0, 0, 0, 0, 3, 0, 0, 0, 99, 0, 0, 0]);

        assert_eq!(StateRecord::decode_owned(&buff), Ok((r, StateRecord::LEN)));
    }

    #[test]
    fn state_record_invalid_state() {
        let buff = [0x07, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            StateRecord::decode_owned(&buff),
            Err(StorageError::InvalidRecord)
        );
    }

    #[test]
    fn short_buffers() {
        let mut buff = [0u8; 8];
        assert_eq!(
            SealRecord::new([1; 32]).encode(&mut buff),
            Err(StorageError::InvalidRecord)
        );
        assert_eq!(
            SealRecord::decode_owned(&buff),
            Err(StorageError::InvalidRecord)
        );
    }
}
