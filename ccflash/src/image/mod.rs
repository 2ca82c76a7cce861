//! Firmware image loading.
//!
//! The flash session consumes a flat byte buffer; this module produces one,
//! either from an Intel HEX file (the format CC2538 toolchains emit) or from
//! an already-flat raw binary.

pub mod hex;

use std::path::Path;

use crate::error::{Error, Result};

/// An immutable firmware image, flattened to contiguous bytes.
///
/// The buffer is owned for the lifetime of the flash session and never
/// mutated by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Wrap an already-flat binary buffer.
    pub fn from_raw(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Parse Intel HEX text into a flat image.
    ///
    /// Address gaps between data records are filled with `0xFF` (the erased
    /// flash state), matching what the chunker expects: one contiguous run
    /// of bytes.
    pub fn from_hex_str(text: &str) -> Result<Self> {
        Ok(Self {
            data: hex::parse(text)?,
        })
    }

    /// Read and parse an Intel HEX file.
    pub fn from_hex_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_hex_str(&text)
    }

    /// Read a raw binary file.
    pub fn from_raw_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_raw(std::fs::read(path)?))
    }

    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the image carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Image length for the download frame's 32-bit length field.
    pub fn len_u32(&self) -> Result<u32> {
        u32::try_from(self.data.len())
            .map_err(|_| Error::InvalidImage("image exceeds 4 GiB".to_string()))
    }

    /// Borrow the flat image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_roundtrip() {
        let image = FirmwareImage::from_raw(vec![1, 2, 3]);
        assert_eq!(image.len(), 3);
        assert!(!image.is_empty());
        assert_eq!(image.bytes(), &[1, 2, 3]);
        assert_eq!(image.len_u32().unwrap(), 3);
    }

    #[test]
    fn test_empty_image() {
        let image = FirmwareImage::from_raw(Vec::new());
        assert!(image.is_empty());
        assert_eq!(image.len_u32().unwrap(), 0);
    }
}
