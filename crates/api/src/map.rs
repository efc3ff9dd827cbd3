//! Registered memory regions shared with the driver.

use std::fmt::Debug;
use std::fs::File;
use std::io;

use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Maps a region of the device into the process.
pub trait Mapper: Debug + Send + Sync {
    /// Maps `extent` bytes of `device` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the mapping fails.
    fn map_region(&self, device: &File, offset: u64, extent: usize) -> io::Result<MmapMut>;
}

/// Shared mapping of the device file itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceMapper;

impl Mapper for DeviceMapper {
    fn map_region(&self, device: &File, offset: u64, extent: usize) -> io::Result<MmapMut> {
        // SAFETY: the driver owns the backing pages and keeps them alive for as
        // long as the device stays open, which outlives every registered map.
        unsafe { MmapOptions::new().offset(offset).len(extent).map_mut(device) }
    }
}

/// Anonymous memory standing in for device memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousMapper;

impl Mapper for AnonymousMapper {
    fn map_region(&self, _device: &File, _offset: u64, extent: usize) -> io::Result<MmapMut> {
        MmapMut::map_anon(extent)
    }
}

/// A named region of memory.
///
/// A map registered only by name carries no memory; every access then fails
/// with [`Error::Unmapped`].
#[derive(Debug)]
pub struct Map {
    name: String,
    extent: u64,
    region: Mutex<Option<MmapMut>>,
}

impl Map {
    /// A map of `extent` bytes without memory behind it.
    pub fn new(name: impl Into<String>, extent: u64) -> Self {
        Self {
            name: name.into(),
            extent,
            region: Mutex::new(None),
        }
    }

    /// A map backed by `region`.
    pub fn with_region(name: impl Into<String>, region: MmapMut) -> Self {
        Self {
            name: name.into(),
            extent: region.len() as u64,
            region: Mutex::new(Some(region)),
        }
    }

    /// A map backed by fresh anonymous memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the memory cannot be mapped.
    pub fn anonymous(name: impl Into<String>, extent: usize) -> Result<Self> {
        Ok(Self::with_region(name, MmapMut::map_anon(extent)?))
    }

    /// The map name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the map in bytes.
    #[must_use]
    pub const fn extent(&self) -> u64 {
        self.extent
    }

    /// Address of the first byte, if the map has memory.
    #[must_use]
    pub fn base(&self) -> Option<usize> {
        self.region
            .lock()
            .as_ref()
            .map(|region| region.as_ptr() as usize)
    }

    /// Whether the map has memory behind it.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.region.lock().is_some()
    }

    /// Fills `[offset, offset + extent)` with copies of the 32-bit `value`
    /// in native byte order. A trailing partial word gets the leading bytes
    /// of `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unmapped`] without memory and [`Error::OutOfRange`]
    /// when the range does not fit.
    pub fn fill(&self, offset: u64, extent: u64, value: u32) -> Result<()> {
        let pattern = value.to_ne_bytes();
        self.with_range(offset, extent, |bytes| {
            for chunk in bytes.chunks_mut(pattern.len()) {
                chunk.copy_from_slice(&pattern[..chunk.len()]);
            }
        })
    }

    /// Copies `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`fill`](Self::fill).
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.with_range(offset, len as u64, |bytes| out.extend_from_slice(bytes))?;
        Ok(out)
    }

    /// Copies `data` into the map at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`fill`](Self::fill).
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.with_range(offset, data.len() as u64, |bytes| {
            bytes.copy_from_slice(data);
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn with_range(&self, offset: u64, extent: u64, f: impl FnOnce(&mut [u8])) -> Result<()> {
        let out_of_range = || Error::OutOfRange {
            map: self.name.clone(),
            offset,
            extent,
        };

        let end = offset.checked_add(extent).ok_or_else(out_of_range)?;
        if end > self.extent {
            return Err(out_of_range());
        }

        let mut region = self.region.lock();
        let region = region
            .as_mut()
            .ok_or_else(|| Error::Unmapped(self.name.clone()))?;

        f(&mut region[offset as usize..end as usize]);
        Ok(())
    }
}
