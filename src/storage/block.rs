use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a fixed-size block inside a named file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId {
    filename: String,
    number: u32,
}

impl BlockId {
    pub fn new(filename: impl Into<String>, number: u32) -> Self {
        Self {
            filename: filename.into(),
            number,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// The block right before this one in the same file, if any.
    pub fn previous(&self) -> Option<BlockId> {
        self.number
            .checked_sub(1)
            .map(|number| BlockId::new(self.filename.clone(), number))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[file {}, block {}]", self.filename, self.number)
    }
}

/// Log Sequence Number. A record's LSN is the number of the log block it
/// was written into, so records sharing a block share an LSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn(pub u32);

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LSN({})", self.0)
    }
}

/// Identifier of the transaction that modified a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(pub i32);

impl TxnId {
    /// Reserved id tagging every write made by the log manager.
    pub const LOG: TxnId = TxnId(-2);

    pub fn is_log(&self) -> bool {
        *self == Self::LOG
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_log() {
            write!(f, "TxnLog")
        } else {
            write!(f, "Txn{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_block_equality_and_hash() {
        let mut map = HashMap::new();
        map.insert(BlockId::new("data.tbl", 3), 1);

        assert!(map.contains_key(&BlockId::new("data.tbl", 3)));
        assert!(!map.contains_key(&BlockId::new("data.tbl", 4)));
        assert!(!map.contains_key(&BlockId::new("other.tbl", 3)));
    }

    #[test]
    fn test_previous() {
        let block = BlockId::new("log", 2);
        assert_eq!(block.previous(), Some(BlockId::new("log", 1)));
        assert_eq!(BlockId::new("log", 0).previous(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(BlockId::new("log", 7).to_string(), "[file log, block 7]");
        assert_eq!(TxnId(4).to_string(), "Txn4");
        assert_eq!(TxnId::LOG.to_string(), "TxnLog");
        assert_eq!(Lsn(2).to_string(), "LSN(2)");
    }
}
