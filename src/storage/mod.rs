use std::fmt::Debug;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::page::PageId;

pub mod disk;
pub mod memory;
pub mod page;

/// A page-granular storage backend for the buffer pool. Pages are opaque
/// PAGE_SIZE byte blocks addressed by page id; the buffer pool is the only
/// caller and serializes access to any single page itself.
///
/// The DiskManager trait is designed as `trait object` compatible, i.e.,
/// follow the [object safety rules](https://doc.rust-lang.org/reference/items/traits.html#object-safety),
/// so the buffer pool can hold any backend behind `Arc<dyn DiskManager>`.
pub trait DiskManager: Debug + Send + Sync {
    /// Fill `buf` (PAGE_SIZE bytes) with the content of the given page.
    /// A page that was never written reads as zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()>;

    /// Durably store `buf` (PAGE_SIZE bytes) as the content of the given page.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()>;

    /// The given page is no longer referenced by the pool. Backends may
    /// reclaim the space or treat this as a no-op.
    fn deallocate_page(&self, page_id: PageId) -> Result<()>;
}

#[derive(Debug, PartialEq, Deserialize)]
pub enum DiskType {
    Memory,
    File,
}

pub fn new_disk_manager(typ: DiskType, path: &str) -> Result<Arc<dyn DiskManager>> {
    match typ {
        DiskType::Memory => Ok(Arc::new(memory::MemoryDiskManager::new())),
        DiskType::File => {
            if path.is_empty() {
                return Err(Error::value("disk file path is empty"));
            }
            Ok(Arc::new(disk::FileDiskManager::new(path)?))
        }
    }
}
