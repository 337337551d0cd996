use crate::storage::block::BlockId;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{Page, INT_SIZE};
use log::debug;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Room for a log block header and one empty record trailer.
pub const MIN_BLOCK_SIZE: usize = 2 * INT_SIZE;

/// Block-granular access to the files of one data directory.
pub struct FileManager {
    dir: PathBuf,
    block_size: usize,
    is_new: bool,
    open_files: Mutex<HashMap<String, File>>,
}

impl FileManager {
    pub fn new(dir: &Path, block_size: usize) -> StorageResult<Self> {
        if block_size < MIN_BLOCK_SIZE {
            return Err(StorageError::InvalidBlockSize {
                block_size,
                min: MIN_BLOCK_SIZE,
            });
        }

        let is_new = !dir.exists();
        if is_new {
            fs::create_dir_all(dir)?;
            debug!("Created data directory {:?}", dir);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            block_size,
            is_new,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Whether the data directory had to be created.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Reads `block` into `page`. Bytes past the end of the file read as zero.
    pub fn read(&self, block: &BlockId, page: &mut Page) -> StorageResult<()> {
        let mut files = self.open_files.lock();
        let file = self.file_handle(&mut files, block.filename())?;
        let offset = self.block_offset(block);
        let file_size = file.metadata()?.len();

        page.clear();
        if offset >= file_size {
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        let available = ((file_size - offset) as usize).min(self.block_size);
        file.read_exact(&mut page.data_mut()[..available])?;
        Ok(())
    }

    pub fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        let mut files = self.open_files.lock();
        let file = self.file_handle(&mut files, block.filename())?;
        let offset = self.block_offset(block);

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.data())?;
        file.sync_all()?;
        Ok(())
    }

    /// Writes `page` as a new block at the end of `filename`.
    pub fn append(&self, filename: &str, page: &Page) -> StorageResult<BlockId> {
        let mut files = self.open_files.lock();
        let file = self.file_handle(&mut files, filename)?;
        let number = (file.metadata()?.len() / self.block_size as u64) as u32;
        let block = BlockId::new(filename, number);

        file.seek(SeekFrom::Start(self.block_offset(&block)))?;
        file.write_all(page.data())?;
        file.sync_all()?;
        Ok(block)
    }

    /// Number of blocks in `filename`.
    pub fn size(&self, filename: &str) -> StorageResult<u32> {
        let mut files = self.open_files.lock();
        let file = self.file_handle(&mut files, filename)?;
        Ok((file.metadata()?.len() / self.block_size as u64) as u32)
    }

    fn file_handle<'a>(
        &self,
        files: &'a mut HashMap<String, File>,
        filename: &str,
    ) -> StorageResult<&'a mut File> {
        match files.entry(filename.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(self.dir.join(filename))?;
                Ok(entry.insert(file))
            }
        }
    }

    fn block_offset(&self, block: &BlockId) -> u64 {
        block.number() as u64 * self.block_size as u64
    }
}
