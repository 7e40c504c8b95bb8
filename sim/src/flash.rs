// Copyright (c) 2022-2023 The MobileCoin Foundation

//! File-backed NOR flash image

use std::{
    fs,
    path::{Path, PathBuf},
};

use embedded_storage::nor_flash::{ErrorType, NorFlash, ReadNorFlash};
use log::debug;

use bearer_core::storage::{MemFlash, MemFlashError};

/// Simulated flash size (2MiB)
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// [`FileFlash`] holds a flash image in memory, written back on [FileFlash::save]
pub struct FileFlash {
    path: PathBuf,
    inner: MemFlash,
    dirty: bool,
}

impl FileFlash {
    /// Open a flash image, creating an erased image if none exists
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let inner = match path.exists() {
            true => {
                let data = fs::read(path)?;
                if data.len() != FLASH_SIZE {
                    return Err(anyhow::anyhow!(
                        "invalid flash image size: {} (expected {})",
                        data.len(),
                        FLASH_SIZE
                    ));
                }
                MemFlash::from_image(data)
            }
            false => {
                debug!("creating erased flash image at '{}'", path.display());
                MemFlash::with_capacity(FLASH_SIZE)
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            inner,
            dirty: !path.exists(),
        })
    }

    /// Write the image back to disk if modified
    pub fn save(&mut self) -> anyhow::Result<()> {
        if self.dirty {
            debug!("writing flash image to '{}'", self.path.display());

            fs::write(&self.path, self.inner.image())?;
            self.dirty = false;
        }

        Ok(())
    }

    /// Flip bits at the provided offset (fault injection)
    pub fn corrupt(&mut self, offset: u32, mask: u8) -> anyhow::Result<()> {
        if offset as usize >= FLASH_SIZE {
            return Err(anyhow::anyhow!("offset 0x{:08x} out of range", offset));
        }

        self.inner.corrupt(offset, mask);
        self.dirty = true;

        Ok(())
    }
}

impl ErrorType for FileFlash {
    type Error = MemFlashError;
}

impl ReadNorFlash for FileFlash {
    const READ_SIZE: usize = MemFlash::READ_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.inner.read(offset, bytes)
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl NorFlash for FileFlash {
    const WRITE_SIZE: usize = MemFlash::WRITE_SIZE;

    const ERASE_SIZE: usize = MemFlash::ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        self.dirty = true;
        self.inner.erase(from, to)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.dirty = true;
        self.inner.write(offset, bytes)
    }
}
