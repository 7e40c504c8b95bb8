// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Persistent record store
//!
//! Each record type occupies one flash erase unit (sector) and is wrapped in a
//! [StoredRecord] envelope tagged with a per-type magic constant and a checksum
//! over the payload. Writes always erase the full sector then program it, and
//! are verified by read-back.
//!
//! ## Sector layout:
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             MAGIC                             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           CHECKSUM                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                            PAYLOAD                            /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     ERASED (0xFF) PADDING                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum detects accidental corruption only, it is _not_ a security
//! mechanism. Tamper evidence is provided by the [seal][crate::seal].

use byteorder::{ByteOrder, LittleEndian};
use embedded_storage::nor_flash::{NorFlash, NorFlashError};
use encdec::{DecodeOwned, Encode};
use static_assertions::const_assert;
use strum::{Display, EnumIter};
use zeroize::Zeroize;

use crate::{
    consts::{KEYS_MAGIC, SEAL_MAGIC, STATE_MAGIC, STORAGE_BASE},
    error::StorageError,
};

mod records;
pub use records::{SealRecord, StateRecord, WalletKeyRecord};

#[cfg(feature = "std")]
mod mem;
#[cfg(feature = "std")]
pub use mem::{MemFlash, MemFlashError, MEM_FLASH_SIZE};

/// Envelope header length (magic + checksum)
pub const HEADER_LEN: usize = 8;

/// Staging buffer for encoded records, bounds record and flash page sizes
const BUFF_LEN: usize = 256;

const_assert!(HEADER_LEN + WalletKeyRecord::LEN <= BUFF_LEN);
const_assert!(HEADER_LEN + StateRecord::LEN <= BUFF_LEN);
const_assert!(HEADER_LEN + SealRecord::LEN <= BUFF_LEN);

/// Persisted record kinds, one sector each
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter)]
pub enum RecordKind {
    Keys,
    State,
    Seal,
}

impl RecordKind {
    /// Sector index within the record area
    pub const fn sector(&self) -> u32 {
        match self {
            RecordKind::Keys => 0,
            RecordKind::State => 1,
            RecordKind::Seal => 2,
        }
    }

    /// Reserved magic constant for this kind
    pub const fn magic(&self) -> u32 {
        match self {
            RecordKind::Keys => KEYS_MAGIC,
            RecordKind::State => STATE_MAGIC,
            RecordKind::Seal => SEAL_MAGIC,
        }
    }
}

/// A fixed-size payload that can be persisted in a [RecordStore]
pub trait Record:
    Sized + Encode<Error = StorageError> + DecodeOwned<Output = Self, Error = StorageError>
{
    /// Record kind (selects sector and magic)
    const KIND: RecordKind;

    /// Encoded payload length
    const LEN: usize;
}

/// Rolling XOR-with-rotate checksum.
///
/// Order sensitive and detects any single-byte change, but trivially forgeable.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |c, b| (c ^ u32::from(*b)).rotate_left(1))
}

/// Raw envelope view over a stored record
#[derive(Clone, PartialEq, Debug)]
pub struct StoredRecord<'a> {
    pub magic: u32,
    pub checksum: u32,
    pub payload: &'a [u8],
}

impl<'a> StoredRecord<'a> {
    /// Wrap a payload with the provided magic, computing the checksum
    pub fn new(magic: u32, payload: &'a [u8]) -> Self {
        Self {
            magic,
            checksum: checksum(payload),
            payload,
        }
    }

    /// Parse an envelope with a payload of `len` bytes
    pub fn parse(buff: &'a [u8], len: usize) -> Result<Self, StorageError> {
        if buff.len() < HEADER_LEN + len {
            return Err(StorageError::InvalidRecord);
        }

        Ok(Self {
            magic: LittleEndian::read_u32(&buff[0..]),
            checksum: LittleEndian::read_u32(&buff[4..]),
            payload: &buff[HEADER_LEN..][..len],
        })
    }

    /// Encode envelope to the provided buffer, returning the encoded length
    pub fn encode(&self, buff: &mut [u8]) -> Result<usize, StorageError> {
        let n = HEADER_LEN + self.payload.len();
        if buff.len() < n {
            return Err(StorageError::InvalidRecord);
        }

        LittleEndian::write_u32(&mut buff[0..], self.magic);
        LittleEndian::write_u32(&mut buff[4..], self.checksum);
        buff[HEADER_LEN..n].copy_from_slice(self.payload);

        Ok(n)
    }

    /// Validate magic then checksum, decoding the payload on success.
    ///
    /// A magic mismatch reports [StorageError::NotFound], a checksum mismatch
    /// [StorageError::Corrupt]. Invalid records are never decoded.
    pub fn validate<R: Record>(&self) -> Result<R, StorageError> {
        if self.magic != R::KIND.magic() {
            return Err(StorageError::NotFound);
        }

        if self.checksum != checksum(self.payload) {
            return Err(StorageError::Corrupt);
        }

        let (r, _n) = R::decode_owned(self.payload)?;

        Ok(r)
    }
}

/// Round `n` up to a multiple of `align`
const fn align_up(n: usize, align: usize) -> usize {
    if align <= 1 {
        return n;
    }
    (n + align - 1) / align * align
}

fn flash_error<E: NorFlashError>(_e: E) -> StorageError {
    #[cfg(feature = "log")]
    log::error!("flash error: {:?}", _e.kind());

    StorageError::Flash
}

/// [`RecordStore`] provides checksummed record persistence over a [NorFlash] device
pub struct RecordStore<F: NorFlash> {
    flash: F,
    base: u32,
}

impl<F: NorFlash> RecordStore<F> {
    /// Create a record store at the default [STORAGE_BASE] offset
    pub fn new(flash: F) -> Self {
        Self::with_base(flash, STORAGE_BASE)
    }

    /// Create a record store at the provided flash offset
    /// (must be aligned to [NorFlash::ERASE_SIZE])
    pub fn with_base(flash: F, base: u32) -> Self {
        Self { flash, base }
    }

    /// Flash offset of the sector holding the provided record kind
    pub fn record_offset(&self, kind: RecordKind) -> u32 {
        self.base + kind.sector() * F::ERASE_SIZE as u32
    }

    /// Access the underlying flash device
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Mutable access to the underlying flash device
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Consume the store, returning the flash device
    pub fn into_inner(self) -> F {
        self.flash
    }

    /// Erase and program a record into its sector, verifying by read-back
    pub fn write_record<R: Record>(&mut self, record: &R) -> Result<(), StorageError> {
        let mut payload = [0u8; BUFF_LEN];
        let mut buff = [0xFFu8; BUFF_LEN];

        let r = self.write_inner(record, &mut payload, &mut buff);

        // Records may contain key material
        payload.zeroize();
        buff.zeroize();

        r
    }

    fn write_inner<R: Record>(
        &mut self,
        record: &R,
        payload: &mut [u8; BUFF_LEN],
        buff: &mut [u8; BUFF_LEN],
    ) -> Result<(), StorageError> {
        let kind = R::KIND;
        let offset = self.record_offset(kind);

        let n = record.encode(&mut payload[..])?;
        let n = StoredRecord::new(kind.magic(), &payload[..n]).encode(&mut buff[..])?;

        let write_len = align_up(n, F::WRITE_SIZE);
        let read_len = align_up(n, F::READ_SIZE);
        if write_len > BUFF_LEN || read_len > BUFF_LEN || n > F::ERASE_SIZE {
            return Err(StorageError::InvalidRecord);
        }

        #[cfg(feature = "log")]
        log::debug!("writing {} record ({} bytes) at 0x{:08x}", kind, n, offset);

        self.flash
            .erase(offset, offset + F::ERASE_SIZE as u32)
            .map_err(flash_error)?;
        self.flash
            .write(offset, &buff[..write_len])
            .map_err(flash_error)?;

        // Read back into the payload buffer (no longer needed)
        let check = &mut payload[..read_len];
        self.flash.read(offset, check).map_err(flash_error)?;

        if check[..n] != buff[..n] {
            #[cfg(feature = "log")]
            log::error!("{} record write verification failed", kind);

            return Err(StorageError::WriteVerifyFailed);
        }

        Ok(())
    }

    /// Read and validate a record from its sector
    pub fn read_record<R: Record>(&mut self) -> Result<R, StorageError> {
        let kind = R::KIND;
        let offset = self.record_offset(kind);

        let read_len = align_up(HEADER_LEN + R::LEN, F::READ_SIZE);
        if read_len > BUFF_LEN {
            return Err(StorageError::InvalidRecord);
        }

        let mut buff = [0u8; BUFF_LEN];
        if let Err(e) = self.flash.read(offset, &mut buff[..read_len]) {
            buff.zeroize();
            return Err(flash_error(e));
        }

        let r = StoredRecord::parse(&buff[..read_len], R::LEN).and_then(|s| s.validate::<R>());

        buff.zeroize();

        match &r {
            Ok(_) => {
                #[cfg(feature = "log")]
                log::debug!("read {} record", kind);
            }
            Err(_e) => {
                #[cfg(feature = "log")]
                log::debug!("no valid {} record: {:?}", kind, _e);
            }
        }

        r
    }

    /// Erase the sector holding the provided record kind
    pub fn erase_record(&mut self, kind: RecordKind) -> Result<(), StorageError> {
        let offset = self.record_offset(kind);

        #[cfg(feature = "log")]
        log::debug!("erasing {} record at 0x{:08x}", kind, offset);

        self.flash
            .erase(offset, offset + F::ERASE_SIZE as u32)
            .map_err(flash_error)
    }
}

#[cfg(test)]
mod test {
    use rand::random;
    use strum::IntoEnumIterator;

    use super::*;
    use crate::{helpers::address_from_str, state::DeviceState};

    fn store() -> RecordStore<MemFlash> {
        RecordStore::new(MemFlash::new())
    }

    fn random_keys() -> WalletKeyRecord {
        let mut public_key = [0u8; 33];
        public_key[0] = 0x02;
        public_key[1..].copy_from_slice(&random::<[u8; 32]>());

        WalletKeyRecord {
            private_key: random(),
            public_key,
            address: address_from_str("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4").unwrap(),
            is_sealed: random(),
            keys_revealed: random(),
        }
    }

    #[test]
    fn checksum_order_sensitive() {
        assert_ne!(checksum(&[1, 2, 3]), checksum(&[3, 2, 1]));
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01]), 0x02);
        assert_eq!(checksum(&[0x01, 0x01]), 0x06);
    }

    #[test]
    fn distinct_magic_and_sectors() {
        for a in RecordKind::iter() {
            for b in RecordKind::iter().filter(|b| *b != a) {
                assert_ne!(a.magic(), b.magic());
                assert_ne!(a.sector(), b.sector());
            }
        }
    }

    #[test]
    fn key_record_round_trip() {
        let mut s = store();

        for _i in 0..16 {
            let keys = random_keys();
            s.write_record(&keys).unwrap();
            assert_eq!(s.read_record::<WalletKeyRecord>(), Ok(keys));
        }
    }

    #[test]
    fn records_do_not_overlap() {
        let mut s = store();

        let keys = random_keys();
        let state = StateRecord::new(DeviceState::Sealed, 7, 1234);
        let seal = SealRecord::new(random());

        s.write_record(&keys).unwrap();
        s.write_record(&state).unwrap();
        s.write_record(&seal).unwrap();

        assert_eq!(s.read_record::<WalletKeyRecord>(), Ok(keys));
        assert_eq!(s.read_record::<StateRecord>(), Ok(state));
        assert_eq!(s.read_record::<SealRecord>(), Ok(seal));
    }

    #[test]
    fn erased_sector_not_found() {
        let mut s = store();

        assert_eq!(s.read_record::<WalletKeyRecord>(), Err(StorageError::NotFound));
        assert_eq!(s.read_record::<StateRecord>(), Err(StorageError::NotFound));
        assert_eq!(s.read_record::<SealRecord>(), Err(StorageError::NotFound));
    }

    #[test]
    fn erase_record() {
        let mut s = store();

        s.write_record(&SealRecord::new(random())).unwrap();
        s.erase_record(RecordKind::Seal).unwrap();

        assert_eq!(s.read_record::<SealRecord>(), Err(StorageError::NotFound));
    }

    /// Any single-byte change to a stored key record is rejected,
    /// as [StorageError::NotFound] in the magic and [StorageError::Corrupt] elsewhere
    #[test]
    fn single_byte_corruption() {
        let keys = random_keys();

        for i in 0..HEADER_LEN + WalletKeyRecord::LEN {
            let mut s = store();
            s.write_record(&keys).unwrap();

            let offset = s.record_offset(RecordKind::Keys) + i as u32;
            s.flash_mut().corrupt(offset, 0x01 << (i % 8));

            let expected = match i < 4 {
                true => StorageError::NotFound,
                false => StorageError::Corrupt,
            };
            assert_eq!(
                s.read_record::<WalletKeyRecord>(),
                Err(expected),
                "corruption at byte {i}"
            );
        }
    }

    #[test]
    fn wrong_kind_not_found() {
        let mut s = store();

        // Write a seal record over the state sector
        let seal = SealRecord::new(random());
        let mut payload = [0u8; SealRecord::LEN];
        seal.encode(&mut payload).unwrap();

        let mut buff = [0xFFu8; 64];
        let n = StoredRecord::new(SEAL_MAGIC, &payload)
            .encode(&mut buff)
            .unwrap();
        let offset = s.record_offset(RecordKind::State);
        s.flash_mut().program(offset, &buff[..n]);

        assert_eq!(s.read_record::<StateRecord>(), Err(StorageError::NotFound));
    }

    #[test]
    fn write_verify_failure() {
        let mut s = store();

        s.flash_mut().fail_verify_after(0);

        assert_eq!(
            s.write_record(&SealRecord::new(random())),
            Err(StorageError::WriteVerifyFailed)
        );
        assert!(s.read_record::<SealRecord>().is_err());
    }

    #[test]
    fn flash_failure() {
        let mut s = RecordStore::with_base(MemFlash::new(), 0x10_0000);

        assert_eq!(
            s.write_record(&SealRecord::new(random())),
            Err(StorageError::Flash)
        );
        assert_eq!(s.read_record::<SealRecord>(), Err(StorageError::Flash));
    }
}
