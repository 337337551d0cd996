pub mod file_manager;

pub use file_manager::{FileManager, DEFAULT_BLOCK_SIZE, MIN_BLOCK_SIZE};
