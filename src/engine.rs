use crate::config::StorageConfig;
use crate::storage::buffer::{BufferPoolManager, LruKReplacer};
use crate::storage::disk::FileManager;
use crate::storage::error::StorageResult;
use crate::storage::wal::LogManager;
use log::info;
use std::sync::Arc;

/// File manager, buffer pool and log manager wired together.
pub struct StorageEngine {
    config: StorageConfig,
    files: Arc<FileManager>,
    buffer_pool: BufferPoolManager,
    log: Arc<LogManager>,
}

impl StorageEngine {
    pub fn open(config: StorageConfig) -> StorageResult<Self> {
        let files = Arc::new(FileManager::new(&config.data_dir, config.block_size)?);
        let replacer = Box::new(LruKReplacer::with_tie_break(
            config.pool_size,
            config.tie_break,
        ));
        let buffer_pool = BufferPoolManager::new(files.clone(), replacer, config.pool_size);
        let log = LogManager::open(buffer_pool.clone(), &config.log_file)?;

        if files.is_new() {
            info!("Created new database in {:?}", config.data_dir);
        } else {
            info!("Opened database in {:?}", config.data_dir);
        }

        Ok(Self {
            config,
            files,
            buffer_pool,
            log,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn files(&self) -> &Arc<FileManager> {
        &self.files
    }

    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.buffer_pool
    }

    pub fn log(&self) -> &Arc<LogManager> {
        &self.log
    }
}
