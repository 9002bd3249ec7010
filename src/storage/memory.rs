use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::storage::page::{PageId, PAGE_SIZE};
use crate::storage::DiskManager;

/// An in-memory DiskManager, mainly for testing the buffer pool without
/// touching the filesystem. Deallocated page ids are recorded so tests can
/// observe that the pool handed a page back.
#[derive(Debug)]
pub struct MemoryDiskManager {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pages: HashMap<PageId, Box<[u8; PAGE_SIZE]>>,
    deallocated: Vec<PageId>,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        MemoryDiskManager { inner: Mutex::new(Inner::default()) }
    }

    /// Number of pages that have been written at least once.
    pub fn num_pages(&self) -> usize {
        self.inner.lock().unwrap().pages.len()
    }

    /// Page ids passed to deallocate_page, in call order.
    pub fn deallocated(&self) -> Vec<PageId> {
        self.inner.lock().unwrap().deallocated.clone()
    }
}

impl Default for MemoryDiskManager {
    fn default() -> Self {
        MemoryDiskManager::new()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(PAGE_SIZE, buf.len());
        let inner = self.inner.lock()?;
        match inner.pages.get(&page_id) {
            Some(page) => buf.copy_from_slice(&page[..]),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        let page: [u8; PAGE_SIZE] = buf.try_into()?;
        let mut inner = self.inner.lock()?;
        inner.pages.insert(page_id, Box::new(page));
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock()?;
        inner.pages.remove(&page_id);
        inner.deallocated.push(page_id);
        Ok(())
    }
}
