//! In-memory image of a single block.
//!
//! A `Page` knows nothing about files. It is a fixed-size byte buffer with
//! typed accessors: 4-byte big-endian integers and length-prefixed UTF-8
//! strings at arbitrary offsets.

use crate::storage::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ByteOrder};

/// Size in bytes of a serialized integer.
pub const INT_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8]>,
}

impl Page {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Number of bytes a string of `len` bytes occupies once serialized.
    pub fn max_string_len(len: usize) -> usize {
        INT_SIZE + len
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn get_int(&self, offset: usize) -> StorageResult<i32> {
        let bytes = self.slice(offset, INT_SIZE)?;
        Ok(BigEndian::read_i32(bytes))
    }

    pub fn set_int(&mut self, offset: usize, value: i32) -> StorageResult<()> {
        let bytes = self.slice_mut(offset, INT_SIZE)?;
        BigEndian::write_i32(bytes, value);
        Ok(())
    }

    pub fn get_bytes(&self, offset: usize) -> StorageResult<&[u8]> {
        let len = self.get_int(offset)?;
        let len = usize::try_from(len).map_err(|_| self.out_of_bounds(offset, INT_SIZE))?;
        self.slice(offset + INT_SIZE, len)
    }

    pub fn set_bytes(&mut self, offset: usize, value: &[u8]) -> StorageResult<()> {
        let len = i32::try_from(value.len())
            .map_err(|_| self.out_of_bounds(offset, Self::max_string_len(value.len())))?;
        // Check the whole range up front so a failed write leaves the page untouched.
        self.slice(offset, Self::max_string_len(value.len()))?;
        self.set_int(offset, len)?;
        self.slice_mut(offset + INT_SIZE, value.len())?
            .copy_from_slice(value);
        Ok(())
    }

    pub fn get_string(&self, offset: usize) -> StorageResult<String> {
        let bytes = self.get_bytes(offset)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|source| StorageError::InvalidString { offset, source })
    }

    pub fn set_string(&mut self, offset: usize, value: &str) -> StorageResult<()> {
        self.set_bytes(offset, value.as_bytes())
    }

    fn slice(&self, offset: usize, len: usize) -> StorageResult<&[u8]> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(&self.data[offset..end]),
            _ => Err(self.out_of_bounds(offset, len)),
        }
    }

    fn slice_mut(&mut self, offset: usize, len: usize) -> StorageResult<&mut [u8]> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(&mut self.data[offset..end]),
            _ => Err(self.out_of_bounds(offset, len)),
        }
    }

    fn out_of_bounds(&self, offset: usize, len: usize) -> StorageError {
        StorageError::OutOfBounds {
            offset,
            len,
            page_size: self.data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_roundtrip_is_big_endian() {
        let mut page = Page::new(64);
        page.set_int(8, 0x0102_0304).unwrap();

        assert_eq!(page.get_int(8).unwrap(), 0x0102_0304);
        assert_eq!(&page.data()[8..12], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_negative_int() {
        let mut page = Page::new(16);
        page.set_int(0, -2).unwrap();
        assert_eq!(page.get_int(0).unwrap(), -2);
    }

    #[test]
    fn test_string_layout() {
        let mut page = Page::new(64);
        page.set_string(4, "Foo").unwrap();

        assert_eq!(page.get_int(4).unwrap(), 3);
        assert_eq!(&page.data()[8..11], b"Foo");
        assert_eq!(page.get_string(4).unwrap(), "Foo");
        assert_eq!(Page::max_string_len(3), 7);
    }

    #[test]
    fn test_empty_string() {
        let mut page = Page::new(16);
        page.set_string(0, "").unwrap();
        assert_eq!(page.get_string(0).unwrap(), "");
    }

    #[test]
    fn test_out_of_bounds() {
        let mut page = Page::new(16);

        assert!(matches!(
            page.set_int(13, 1),
            Err(StorageError::OutOfBounds { offset: 13, .. })
        ));
        assert!(page.get_int(16).is_err());
        assert!(page.set_string(8, "too long!").is_err());

        // A rejected write does not leave a partial length prefix behind.
        assert_eq!(page.get_int(8).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_length_prefix() {
        let mut page = Page::new(16);
        page.set_int(0, -5).unwrap();
        assert!(page.get_string(0).is_err());

        page.set_int(0, 100).unwrap();
        assert!(page.get_string(0).is_err());
    }

    #[test]
    fn test_invalid_utf8() {
        let mut page = Page::new(16);
        page.set_bytes(0, &[0xff, 0xfe]).unwrap();
        assert!(matches!(
            page.get_string(0),
            Err(StorageError::InvalidString { offset: 0, .. })
        ));
    }

    #[test]
    fn test_clear() {
        let mut page = Page::new(8);
        page.set_int(0, 7).unwrap();
        page.clear();
        assert!(page.data().iter().all(|&b| b == 0));
    }
}
