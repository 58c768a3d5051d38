//! Non-volatile storage abstractions
//!
//! Models an EEPROM-style device: byte addressable, no erase step, and no
//! atomicity beyond a single byte. Integrity checking is the caller's job.

/// Errors from non-volatile storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// Access extends past the end of the device
    OutOfBounds,
    /// The device reported a failure
    Device,
}

/// Byte-addressable non-volatile storage
pub trait NvStorage {
    /// Total addressable size in bytes
    fn capacity(&self) -> usize;

    /// Fill `buf` with the bytes starting at `offset`
    fn read_bytes(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `bytes` starting at `offset`
    ///
    /// Implementations may write byte by byte; a power loss mid-call can leave
    /// any prefix of `bytes` committed.
    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError>;
}

impl<S: NvStorage + ?Sized> NvStorage for &mut S {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read_bytes(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read_bytes(offset, buf)
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).write_bytes(offset, bytes)
    }
}

/// RAM-backed storage of `N` bytes
///
/// Starts filled with `0xFF` like an erased EEPROM. Used on the host and in
/// tests; also handy as a staging buffer on boards without real EEPROM.
#[derive(Debug, Clone)]
pub struct RamStorage<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Default for RamStorage<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RamStorage<N> {
    /// Create erased storage
    pub const fn new() -> Self {
        Self { bytes: [0xFF; N] }
    }

    /// Raw contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw contents, mutable (lets tests corrupt the image)
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    fn range(offset: usize, len: usize) -> Result<core::ops::Range<usize>, StorageError> {
        let end = offset.checked_add(len).ok_or(StorageError::OutOfBounds)?;
        if end > N {
            return Err(StorageError::OutOfBounds);
        }
        Ok(offset..end)
    }
}

impl<const N: usize> NvStorage for RamStorage<N> {
    fn capacity(&self) -> usize {
        N
    }

    fn read_bytes(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        let range = Self::range(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        let range = Self::range(offset, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }
}
