use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::container::hash::ExtendibleHashTable;
use crate::error::{Error, Result};
use crate::storage::page::{FrameId, Page, PageId, INVALID_PAGE_ID};
use crate::storage::DiskManager;
use crate::wal::LogManager;

use super::replacer::{Replacer, SyncLRUKReplacer};

/// Entries a page table bucket holds before it splits.
const PAGE_TABLE_BUCKET_SIZE: usize = 4;

/// The buffer pool is responsible for moving physical pages back and forth
/// from main memory to disk. It allows a DBMS to support databases that are
/// larger than the amount of memory available to the system.
///
/// The buffer pool's operations are transparent to other parts in the system.
/// For example, the system asks the buffer pool for a page using its unique
/// identifier (page_id) and it does not know whether that page is already in
/// memory or whether the system has to retrieve it from disk.
struct BufferPool {
    pool_size: usize,
    /// page-granular storage backend.
    disk: Arc<dyn DiskManager>,
    /// handle for write-ahead log hooks, held but not yet invoked by any
    /// of the pool operations.
    log_manager: Option<Arc<LogManager>>,
    /// array of buffer pool pages. use the array index as
    /// FrameId, i.e., the FrameId is in range: [0, pool_size).
    pages: Vec<Arc<Page>>,
    /// page table for keeping track of buffer pool pages.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// list of free frames that don't have any pages on them.
    free_list: VecDeque<FrameId>,
    /// Replacer to find unpinned pages for replacement.
    replacer: Arc<dyn Replacer>,
    /// The next page id to be allocated. Strictly monotonic, ids are
    /// never reused.
    next_page_id: PageId,
}

impl BufferPool {
    fn new(
        disk: Arc<dyn DiskManager>,
        pool_size: usize,
        replacer_k: usize,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        let page_table = ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE);
        let replacer: Arc<dyn Replacer> = Arc::new(SyncLRUKReplacer::new(replacer_k, pool_size));
        for i in 0..pool_size {
            pages.push(Arc::new(Page::new()));
            // initially, every page is in the free list
            free_list.push_back(i);
        }
        BufferPool { pool_size, disk, log_manager, pages, page_table, free_list, replacer, next_page_id: 0 }
    }

    /// Create a new page in the buffer pool, return the new page id and the
    /// pinned page, or Error::BufferPoolNoAvailableFrame if all frames are
    /// currently in use and not evictable(in another word, pinned).
    ///
    /// Pick the replacement frame from either the free list or the replacer
    /// (always find from the free list first). If the replacement frame has a
    /// dirty page, write it back to the disk first. reset the memory and
    /// metadata for the new page.
    ///
    /// Remember to "pin" the frame by calling replacer.set_evictable(frame_id, false)
    /// so that the replacer wouldn't evict the frame before the buffer pool
    /// manager "unpin" it.
    fn new_page(&mut self) -> Result<(PageId, Arc<Page>)> {
        let mut frame_id: Option<FrameId> = None;
        // check if we have free frame available
        if let Some(id) = self.free_list.pop_front() {
            frame_id = Some(id);
        }
        // we have no free frame available, try to evict one
        if frame_id.is_none() {
            frame_id = self.replacer.evict();
        }
        if frame_id.is_none() {
            // no evictable frame found
            return Err(Error::BufferPoolNoAvailableFrame);
        }

        // found a usable frame
        let frame_id = frame_id.unwrap();
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        let prev_page_id = guard.id;

        // flush the in-memory page as the storage page if it is dirty.
        if guard.is_dirty {
            self.disk.write_page(prev_page_id, &guard.data[..])?;
        }
        // unlink the evicted page from page table
        if prev_page_id != INVALID_PAGE_ID {
            self.page_table.remove(&prev_page_id);
            debug!("evicted page {} from frame {}", prev_page_id, frame_id);
        }
        // clean page frame first
        guard.clear();
        // allocating new page id
        let new_page_id = self.allocate_page();
        // set the page with new page id
        guard.id = new_page_id;
        // pin the new page with initial value 1
        guard.pin_count = 1;
        // link the new page with frame into page table
        self.page_table.insert(new_page_id, frame_id);
        // record frame access
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        drop(guard);
        Ok((new_page_id, page))
    }

    /// Fetch the requested page with the given page id from the buffer pool,
    /// return no available frame error if the page needs to be fetched from
    /// disk but all frames are currently in use and not evictable(in other
    /// words, pinned).
    ///
    /// First search for page_id in the buffer pool. if not found, pick a
    /// replacement from either the free list or the replacer(always find from
    /// the free list first), read the page from disk and replace the old page
    /// in the frame. similar to new_page, if the old page is dirty, write it
    /// back to disk and update the metadata of the new page.
    fn fetch_page(&mut self, page_id: PageId) -> Result<Arc<Page>> {
        assert_ne!(INVALID_PAGE_ID, page_id, "fetch of the invalid page id");

        // check if page table has the page id
        if let Some(frame_id) = self.page_table.find(&page_id) {
            // we have the page frame in buffer pool already,
            // increase pin count, record frame access then
            // return it.
            let page = Arc::clone(&self.pages[frame_id]);
            let mut guard = page.write()?;
            guard.pin_count += 1;
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);

            drop(guard);
            return Ok(page);
        }

        // page not found, try to pick a replacement from the free list.
        let mut frame_id: Option<FrameId> = None;
        if let Some(id) = self.free_list.pop_front() {
            frame_id = Some(id);
        }
        // if no free frame in free list, try to pick one from replacer.
        if frame_id.is_none() {
            frame_id = self.replacer.evict();
        }
        // if both free list and replacer have no available frame can be
        // replaced, return with Error::BufferPoolNoAvailableFrame error.
        if frame_id.is_none() {
            return Err(Error::BufferPoolNoAvailableFrame);
        }
        // evict the page held by the victim frame
        let frame_id = frame_id.unwrap();
        let page = Arc::clone(&self.pages[frame_id]);
        let mut guard = page.write()?;
        let prev_page_id = guard.id;

        // flush the in-memory page as the storage page if it is dirty.
        if guard.is_dirty {
            self.disk.write_page(prev_page_id, &guard.data[..])?;
        }
        // unlink the evicted page from page table
        if prev_page_id != INVALID_PAGE_ID {
            self.page_table.remove(&prev_page_id);
            debug!("evicted page {} from frame {}", prev_page_id, frame_id);
        }

        // clean page frame first, then fetch the page from disk
        guard.clear();
        self.disk.read_page(page_id, &mut guard.data[..])?;
        guard.id = page_id;
        guard.pin_count = 1;
        // link the new page with frame into page table
        self.page_table.insert(page_id, frame_id);
        // record frame access
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        drop(guard);
        Ok(page)
    }

    /// Unpin the target page from the buffer pool. If page_id is not in the
    /// buffer pool or its pin count is already 0, return false and change
    /// nothing.
    ///
    /// Decrement the pin count of a page. If the pin count reaches 0, the
    /// frame should be evictable by the replacer. The is_dirty flag ORs into
    /// the page's dirty bit: once dirty, the page stays dirty until a flush.
    fn unpin_page(&mut self, page_id: PageId, is_dirty: bool) -> bool {
        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return false,
        };
        let page = &self.pages[frame_id];
        let mut guard = page.write().unwrap();
        if guard.pin_count == 0 {
            return false;
        }
        if is_dirty {
            guard.is_dirty = true;
        }
        guard.pin_count -= 1;
        if guard.pin_count == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Flush the target page to disk regardless of the dirty flag, and unset
    /// the dirty flag of the page after flushing.
    ///
    /// Return false if the page cannot be found in the page table, true
    /// otherwise. The pin state is left alone, flushing a pinned page is fine.
    fn flush_page(&mut self, page_id: PageId) -> Result<bool> {
        assert_ne!(INVALID_PAGE_ID, page_id, "flush of the invalid page id");

        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(false),
        };
        let page = &self.pages[frame_id];
        let mut guard = page.write()?;

        self.disk.write_page(guard.id, &guard.data[..])?;
        guard.is_dirty = false;

        Ok(true)
    }

    /// Flush every frame that holds a page to disk and unset its dirty flag.
    fn flush_all_pages(&mut self) -> Result<()> {
        for page in &self.pages {
            let mut guard = page.write()?;
            if guard.id == INVALID_PAGE_ID {
                continue;
            }
            self.disk.write_page(guard.id, &guard.data[..])?;
            guard.is_dirty = false;
        }
        Ok(())
    }

    /// Delete a page from the buffer pool. if the page is not in the buffer
    /// pool, do nothing and return true. if the page is pinned and cannot be
    /// deleted, return false immediately.
    ///
    /// After deleting the page from the page table, stop tracking the frame in
    /// the replacer and add the frame back to the free list. Also reset the
    /// page frame's memory and metadata.
    ///
    /// Deleting a page from the pool also deallocates the page on the disk.
    fn delete_page(&mut self, page_id: PageId) -> Result<bool> {
        let frame_id = match self.page_table.find(&page_id) {
            Some(frame_id) => frame_id,
            None => return Ok(true),
        };
        let page = &self.pages[frame_id];
        let mut guard = page.write()?;
        if guard.pin_count > 0 {
            // a pinned frame must have been set non-evictable
            debug_assert!(!self.replacer.is_evictable(frame_id));
            return Ok(false);
        }
        // unlink the page from page table
        self.page_table.remove(&page_id);
        // stop tracking the frame in replacer
        self.replacer.remove(frame_id);
        // add back to free list
        self.free_list.push_back(frame_id);
        // clean page frame
        guard.clear();
        // free the page on the disk as well
        self.disk.deallocate_page(page_id)?;
        debug!("deleted page {} from frame {}", page_id, frame_id);

        Ok(true)
    }

    fn allocate_page(&mut self) -> PageId {
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        page_id
    }
}

/// Buffer pool manager wrap buffer pool with a mutex for concurrent access,
/// basically all the heavy lifting are happens in the buffer pool. Disk I/O
/// runs while the latch is held: the pool is the serialization point for any
/// single page.
pub struct BufferPoolManager {
    /// hold the actual buffer pool protected by a mutex latch.
    inner: Arc<Mutex<BufferPool>>,
}

impl BufferPoolManager {
    pub fn new(
        disk: Arc<dyn DiskManager>,
        pool_size: usize,
        replacer_k: usize,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let inner = BufferPool::new(disk, pool_size, replacer_k, log_manager);
        BufferPoolManager { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Create a new page in buffer pool, pinned once on return.
    pub fn new_page(&self) -> Result<(PageId, Arc<Page>)> {
        let mut inner = self.inner.lock()?;
        inner.new_page()
    }

    /// Fetch the requested page with the given page id from the buffer pool,
    /// pinned once on return.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        let mut inner = self.inner.lock()?;
        inner.fetch_page(page_id)
    }

    /// Unpin the target page from the buffer pool. If page_id is not in the
    /// buffer pool or its pin count is already 0, return false.
    ///
    /// Decrement the pin count of a page. If the pin count reaches 0, the
    /// frame should be evictable by the replacer. Also, OR the dirty flag on
    /// the page to indicate if the page was modified.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.unpin_page(page_id, is_dirty)
    }

    /// Flush the target page to disk regardless of the dirty flag and unset
    /// the dirty flag of the page after flushing.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.flush_page(page_id)
    }

    /// Flush all the pages in the buffer pool to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut inner = self.inner.lock()?;
        inner.flush_all_pages()
    }

    /// Delete a page from buffer pool. if the page is not in the buffer pool,
    /// do nothing and return true. if the page is pinned and cannot be
    /// deleted, return false immediately.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.inner.lock()?;
        inner.delete_page(page_id)
    }

    /// Number of frames the pool owns.
    pub fn pool_size(&self) -> usize {
        self.inner.lock().unwrap().pool_size
    }

    /// Number of frames that hold no page.
    pub fn free_frames(&self) -> usize {
        self.inner.lock().unwrap().free_list.len()
    }

    /// Number of resident pages, i.e., page table entries.
    pub fn resident_pages(&self) -> usize {
        self.inner.lock().unwrap().page_table.len()
    }

    /// The write-ahead log handle the pool was constructed with, if any.
    pub fn log_manager(&self) -> Option<Arc<LogManager>> {
        self.inner.lock().unwrap().log_manager.clone()
    }
}
