use std::ops::Deref;
use std::sync::RwLock;

/// Logical id of a page in the backing storage file.
pub type PageId = i64;

/// Index of a frame in the buffer pool, in range [0, pool_size).
pub type FrameId = usize;

/// Size of a data page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel for a frame that holds no page.
pub const INVALID_PAGE_ID: PageId = -1;

/// The actual page data that include in-memory metadata
/// like dirty bit and pin count etc. and the data on storage.
pub struct PageData {
    pub id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
    pub is_dirty: bool,
    pub pin_count: i32,
}

impl PageData {
    fn new() -> Self {
        Self {
            id: INVALID_PAGE_ID,
            data: Box::new([0u8; PAGE_SIZE]),
            is_dirty: false,
            pin_count: 0,
        }
    }

    /// Reset the frame to the "holds no page" state: zeroed data,
    /// invalid id, clean, unpinned.
    pub fn clear(&mut self) {
        self.id = INVALID_PAGE_ID;
        self.is_dirty = false;
        self.pin_count = 0;
        self.data.fill(0);
    }
}

/// Page act as the container of the actual page data for
/// providing concurrent access protection.
pub struct Page {
    inner: RwLock<PageData>,
}

impl Page {
    /// Allocate a page frame in memory with PAGE_SIZE zeroed bytes and
    /// init the metadata accordingly.
    pub fn new() -> Self {
        Page { inner: RwLock::new(PageData::new()) }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}

impl Deref for Page {
    type Target = RwLock<PageData>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[test]
    fn test_page_clear() -> Result<()> {
        let page = Page::new();

        let mut guard = page.write()?;
        guard.id = 42;
        guard.pin_count = 2;
        guard.is_dirty = true;
        guard.data[..4].copy_from_slice(b"data");

        guard.clear();
        assert_eq!(INVALID_PAGE_ID, guard.id);
        assert_eq!(0, guard.pin_count);
        assert!(!guard.is_dirty);
        assert!(guard.data.iter().all(|&b| b == 0));

        Ok(())
    }
}
