use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use log::trace;

use crate::error::Result;
use crate::storage::page::{PageId, PAGE_SIZE};
use crate::storage::DiskManager;

/// DiskManager backed by a single file of PAGE_SIZE-aligned pages, the
/// page id times PAGE_SIZE is the byte offset of the page in the file.
#[derive(Debug)]
pub struct FileDiskManager {
    file: Mutex<File>,
}

impl FileDiskManager {
    /// Open (or create) the backing file at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
        Ok(FileDiskManager { file: Mutex::new(file) })
    }

    fn offset(page_id: PageId) -> u64 {
        debug_assert!(page_id >= 0, "page id {} is not addressable", page_id);
        page_id as u64 * PAGE_SIZE as u64
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(PAGE_SIZE, buf.len());
        let mut file = self.file.lock()?;
        let offset = Self::offset(page_id);
        // a page past the end of the file was allocated but never written,
        // it reads as zeroes
        if offset >= file.metadata()?.len() {
            buf.fill(0);
            return Ok(());
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        trace!("read page {} from disk", page_id);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(PAGE_SIZE, buf.len());
        let mut file = self.file.lock()?;
        file.seek(SeekFrom::Start(Self::offset(page_id)))?;
        file.write_all(buf)?;
        file.flush()?;
        trace!("wrote page {} to disk", page_id);
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        // the file keeps the page slot, a later write simply reuses it
        trace!("deallocated page {}", page_id);
        Ok(())
    }
}
