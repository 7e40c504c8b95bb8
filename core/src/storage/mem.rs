// Copyright (c) 2022-2023 The MobileCoin Foundation

//! RAM-backed NOR flash, used for host builds and as the image behind
//! file-backed flash in the simulator

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

/// Default [MemFlash] capacity
pub const MEM_FLASH_SIZE: usize = 512 * 1024;

/// [MemFlash] driver errors
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MemFlashError {
    OutOfBounds,
    NotAligned,
}

impl NorFlashError for MemFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            MemFlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            MemFlashError::NotAligned => NorFlashErrorKind::NotAligned,
        }
    }
}

/// RAM-backed NOR flash, programming can only clear bits
#[derive(Clone, Debug)]
pub struct MemFlash {
    data: Vec<u8>,
    writes: usize,
    verify_fault: Option<usize>,
}

impl MemFlash {
    /// Create an erased flash of [MEM_FLASH_SIZE] bytes
    pub fn new() -> Self {
        Self::with_capacity(MEM_FLASH_SIZE)
    }

    /// Create an erased flash of the provided size
    pub fn with_capacity(n: usize) -> Self {
        Self {
            data: vec![0xFF; n],
            writes: 0,
            verify_fault: None,
        }
    }

    /// Create a flash from an existing image
    pub fn from_image(data: Vec<u8>) -> Self {
        Self {
            data,
            writes: 0,
            verify_fault: None,
        }
    }

    /// Raw flash contents
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Number of program operations performed
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Corrupt the program operation following `n` further successful
    /// writes, so the programmed data does not match on read-back
    pub fn fail_verify_after(&mut self, n: usize) {
        self.verify_fault = Some(self.writes + n);
    }

    /// Flip bits at the provided offset
    pub fn corrupt(&mut self, offset: u32, mask: u8) {
        self.data[offset as usize] ^= mask;
    }

    /// Overwrite bytes directly, bypassing NOR semantics
    pub fn program(&mut self, offset: u32, bytes: &[u8]) {
        let o = offset as usize;
        self.data[o..][..bytes.len()].copy_from_slice(bytes);
    }

    fn check(&self, offset: u32, len: usize, align: usize) -> Result<usize, MemFlashError> {
        let o = offset as usize;

        if o % align != 0 || len % align != 0 {
            return Err(MemFlashError::NotAligned);
        }
        if o.checked_add(len).map(|e| e > self.data.len()).unwrap_or(true) {
            return Err(MemFlashError::OutOfBounds);
        }

        Ok(o)
    }
}

impl Default for MemFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorType for MemFlash {
    type Error = MemFlashError;
}

impl ReadNorFlash for MemFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let o = self.check(offset, bytes.len(), Self::READ_SIZE)?;
        bytes.copy_from_slice(&self.data[o..][..bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for MemFlash {
    const WRITE_SIZE: usize = 4;

    const ERASE_SIZE: usize = 4096;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if to < from {
            return Err(MemFlashError::OutOfBounds);
        }
        let o = self.check(from, (to - from) as usize, Self::ERASE_SIZE)?;
        self.data[o..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let o = self.check(offset, bytes.len(), Self::WRITE_SIZE)?;

        for (d, b) in self.data[o..][..bytes.len()].iter_mut().zip(bytes) {
            *d &= *b;
        }

        if self.verify_fault == Some(self.writes) && !bytes.is_empty() {
            self.data[o] ^= 0xFF;
            self.verify_fault = None;
        }

        self.writes += 1;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nor_write_clears_bits() {
        let mut f = MemFlash::with_capacity(8192);

        f.write(0, &[0xF0, 0x0F, 0xFF, 0x00]).unwrap();
        f.write(0, &[0x3C, 0x3C, 0x3C, 0x3C]).unwrap();

        let mut b = [0u8; 4];
        f.read(0, &mut b).unwrap();
        assert_eq!(b, [0x30, 0x0C, 0x3C, 0x00]);

        f.erase(0, 4096).unwrap();
        f.read(0, &mut b).unwrap();
        assert_eq!(b, [0xFF; 4]);
    }

    #[test]
    fn bounds_and_alignment() {
        let mut f = MemFlash::with_capacity(8192);

        assert_eq!(f.write(2, &[0u8; 4]), Err(MemFlashError::NotAligned));
        assert_eq!(f.erase(0, 100), Err(MemFlashError::NotAligned));
        assert_eq!(f.erase(8192, 12288), Err(MemFlashError::OutOfBounds));
        assert_eq!(f.read(8190, &mut [0u8; 4]), Err(MemFlashError::OutOfBounds));
    }
}
