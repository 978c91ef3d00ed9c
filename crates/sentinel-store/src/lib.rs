//! sentinel-store — durable collections and execution history.

pub mod collection;
pub mod history;

pub use collection::{load_list, save_list, CollectionStore, FsStore, MemoryStore};
pub use history::{HistoryStore, DEFAULT_CAPACITY, HISTORY_COLLECTION};
