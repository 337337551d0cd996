//! Log values and the raw records handed back by the log iterator.
//!
//! The on-disk format carries no type tags: an integer is 4 bytes and a
//! string is a 4-byte length followed by its bytes. Whoever reads a record
//! back has to know the sequence of kinds it was written with.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::storage::block::{Lsn, TxnId};
use crate::storage::buffer::PinnedBuffer;
use crate::storage::error::StorageResult;
use crate::storage::page::{Page, INT_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Str,
}

/// A single value of a log record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogValue {
    Int(i32),
    Str(String),
}

impl LogValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            LogValue::Int(_) => ValueKind::Int,
            LogValue::Str(_) => ValueKind::Str,
        }
    }

    /// Number of bytes the value occupies in a log block.
    pub fn encoded_len(&self) -> usize {
        match self {
            LogValue::Int(_) => INT_SIZE,
            LogValue::Str(s) => Page::max_string_len(s.len()),
        }
    }

    pub(crate) fn write_to(
        &self,
        buffer: &PinnedBuffer,
        offset: usize,
        lsn: Lsn,
    ) -> StorageResult<()> {
        match self {
            LogValue::Int(v) => buffer.set_int(offset, *v, TxnId::LOG, Some(lsn)),
            LogValue::Str(s) => buffer.set_string(offset, s, TxnId::LOG, Some(lsn)),
        }
    }

    fn read_from(page: &Page, offset: usize, kind: ValueKind) -> StorageResult<Self> {
        match kind {
            ValueKind::Int => Ok(LogValue::Int(page.get_int(offset)?)),
            ValueKind::Str => Ok(LogValue::Str(page.get_string(offset)?)),
        }
    }
}

impl From<i32> for LogValue {
    fn from(v: i32) -> Self {
        LogValue::Int(v)
    }
}

impl From<&str> for LogValue {
    fn from(s: &str) -> Self {
        LogValue::Str(s.to_string())
    }
}

impl From<String> for LogValue {
    fn from(s: String) -> Self {
        LogValue::Str(s)
    }
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Int(v) => write!(f, "{}", v),
            LogValue::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// The raw bytes of one log record, read positionally.
#[derive(Debug, Clone)]
pub struct LogRecord {
    lsn: Lsn,
    data: Page,
    position: usize,
}

impl LogRecord {
    pub(crate) fn new(lsn: Lsn, bytes: &[u8]) -> Self {
        let mut data = Page::new(bytes.len());
        data.data_mut().copy_from_slice(bytes);
        Self {
            lsn,
            data,
            position: 0,
        }
    }

    /// LSN (log block number) the record was written with.
    pub fn lsn(&self) -> Lsn {
        self.lsn
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.data()
    }

    pub fn len(&self) -> usize {
        self.data.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.len() - self.position
    }

    pub fn next_int(&mut self) -> StorageResult<i32> {
        let value = self.data.get_int(self.position)?;
        self.position += INT_SIZE;
        Ok(value)
    }

    pub fn next_string(&mut self) -> StorageResult<String> {
        let value = self.data.get_string(self.position)?;
        self.position += Page::max_string_len(value.len());
        Ok(value)
    }

    pub fn next_value(&mut self, kind: ValueKind) -> StorageResult<LogValue> {
        let value = LogValue::read_from(&self.data, self.position, kind)?;
        self.position += value.encoded_len();
        Ok(value)
    }

    /// Reads the next values in the given order.
    pub fn decode(&mut self, kinds: &[ValueKind]) -> StorageResult<Vec<LogValue>> {
        kinds.iter().map(|&kind| self.next_value(kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::error::StorageError;

    fn encode(values: &[LogValue]) -> Vec<u8> {
        let size = values.iter().map(LogValue::encoded_len).sum();
        let mut page = Page::new(size);
        let mut offset = 0;
        for value in values {
            match value {
                LogValue::Int(v) => page.set_int(offset, *v).unwrap(),
                LogValue::Str(s) => page.set_string(offset, s).unwrap(),
            }
            offset += value.encoded_len();
        }
        page.data().to_vec()
    }

    #[test]
    fn test_encoded_len() {
        assert_eq!(LogValue::Int(7).encoded_len(), 4);
        assert_eq!(LogValue::from("Foo").encoded_len(), 7);
        assert_eq!(LogValue::from(String::new()).encoded_len(), 4);
    }

    #[test]
    fn test_positional_reads() {
        let values = vec![LogValue::from("Foo"), LogValue::Int(-3), LogValue::from("Bar")];
        let mut record = LogRecord::new(Lsn(2), &encode(&values));

        assert_eq!(record.lsn(), Lsn(2));
        assert_eq!(record.len(), 7 + 4 + 7);
        assert_eq!(record.next_string().unwrap(), "Foo");
        assert_eq!(record.next_int().unwrap(), -3);
        assert_eq!(record.remaining(), 7);
        assert_eq!(record.next_string().unwrap(), "Bar");
        assert_eq!(record.remaining(), 0);
    }

    #[test]
    fn test_decode_with_kinds() {
        let values = vec![LogValue::Int(1), LogValue::from("x")];
        let mut record = LogRecord::new(Lsn(0), &encode(&values));

        let decoded = record.decode(&[ValueKind::Int, ValueKind::Str]).unwrap();
        assert_eq!(decoded, values);
        assert_eq!(decoded[1].kind(), ValueKind::Str);
    }

    #[test]
    fn test_read_past_end() {
        let mut record = LogRecord::new(Lsn(0), &encode(&[LogValue::Int(1)]));
        record.next_int().unwrap();
        assert!(matches!(
            record.next_int(),
            Err(StorageError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(LogValue::Int(5).to_string(), "5");
        assert_eq!(LogValue::from("ab").to_string(), "\"ab\"");
    }
}
