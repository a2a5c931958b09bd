//! Component A: fixed-size-page file I/O with free-page reuse (spec §4.A).

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::config::PAGE_SIZE;
use crate::error::{GraphError, GraphResult};
use crate::storage::page::{zeroed_page, Page};

struct FileInner {
    file: File,
    /// Total number of pages currently in the file (including any in
    /// `free_pages`).
    num_pages: u64,
    /// Pages available for reuse by `add_page`, lowest index first.
    free_pages: BTreeSet<u64>,
}

/// An ordered sequence of fixed-size pages backing one logical file.
///
/// Individual `read`/`write` calls are atomic per page because the whole
/// operation (seek + I/O) runs under the single handle lock; metadata
/// mutation (`add_page`, `free`, `truncate_to`) takes the same lock, so
/// readers never observe a half-updated `num_pages`/`free_pages` pair.
pub struct PageFileHandle {
    inner: Mutex<FileInner>,
}

impl PageFileHandle {
    pub fn open(path: impl AsRef<Path>) -> GraphResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let num_pages = len / PAGE_SIZE as u64;
        Ok(Self {
            inner: Mutex::new(FileInner {
                file,
                num_pages,
                free_pages: BTreeSet::new(),
            }),
        })
    }

    /// Appends a zeroed page, reusing a freed page slot first.
    pub fn add_page(&self) -> GraphResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&idx) = inner.free_pages.iter().next() {
            inner.free_pages.remove(&idx);
            let page = zeroed_page();
            Self::write_at(&mut inner.file, idx, &page)?;
            return Ok(idx);
        }
        let idx = inner.num_pages;
        inner.num_pages += 1;
        let page = zeroed_page();
        Self::write_at(&mut inner.file, idx, &page)?;
        Ok(idx)
    }

    pub fn read(&self, page_index: u64, buf: &mut Page) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if page_index >= inner.num_pages {
            return Err(GraphError::invalid_input(format!(
                "page {} out of range (num_pages={})",
                page_index, inner.num_pages
            )));
        }
        inner
            .file
            .seek(SeekFrom::Start(page_index * PAGE_SIZE as u64))?;
        inner.file.read_exact(buf)?;
        Ok(())
    }

    pub fn write(&self, page_index: u64, buf: &Page) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if page_index >= inner.num_pages {
            return Err(GraphError::invalid_input(format!(
                "page {} out of range (num_pages={})",
                page_index, inner.num_pages
            )));
        }
        Self::write_at(&mut inner.file, page_index, buf)
    }

    fn write_at(file: &mut File, page_index: u64, buf: &Page) -> GraphResult<()> {
        file.seek(SeekFrom::Start(page_index * PAGE_SIZE as u64))?;
        file.write_all(buf)?;
        Ok(())
    }

    /// Returns `page_index` to the free set. If it is the current last page
    /// and the free set already extends contiguously to the tail, the file
    /// is truncated instead of merely marking the page free.
    pub fn free(&self, page_index: u64) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.free_pages.insert(page_index);

        // Tail-truncate: shrink num_pages while the highest page is free.
        while inner.num_pages > 0 && inner.free_pages.contains(&(inner.num_pages - 1)) {
            let last = inner.num_pages - 1;
            inner.free_pages.remove(&last);
            inner.num_pages -= 1;
        }
        let new_len = inner.num_pages * PAGE_SIZE as u64;
        inner.file.set_len(new_len)?;
        Ok(())
    }

    pub fn num_pages(&self) -> u64 {
        self.inner.lock().unwrap().num_pages
    }

    pub fn truncate_to(&self, n: u64) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.free_pages.retain(|&p| p < n);
        inner.num_pages = n;
        inner.file.set_len(n * PAGE_SIZE as u64)?;
        Ok(())
    }

    pub fn flush(&self) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.file.flush()?;
        inner.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_read_write_roundtrip() {
        let dir = tempdir().unwrap();
        let handle = PageFileHandle::open(dir.path().join("data.bin")).unwrap();
        let p0 = handle.add_page().unwrap();
        let p1 = handle.add_page().unwrap();
        assert_eq!(p0, 0);
        assert_eq!(p1, 1);
        assert_eq!(handle.num_pages(), 2);

        let mut buf = zeroed_page();
        buf[0] = 42;
        handle.write(p1, &buf).unwrap();

        let mut read_back = zeroed_page();
        handle.read(p1, &mut read_back).unwrap();
        assert_eq!(read_back[0], 42);
    }

    #[test]
    fn free_tail_page_truncates() {
        let dir = tempdir().unwrap();
        let handle = PageFileHandle::open(dir.path().join("data.bin")).unwrap();
        handle.add_page().unwrap();
        let p1 = handle.add_page().unwrap();
        assert_eq!(handle.num_pages(), 2);

        handle.free(p1).unwrap();
        assert_eq!(handle.num_pages(), 1);
    }

    #[test]
    fn free_then_reuse_non_tail_page() {
        let dir = tempdir().unwrap();
        let handle = PageFileHandle::open(dir.path().join("data.bin")).unwrap();
        let p0 = handle.add_page().unwrap();
        handle.add_page().unwrap();
        handle.add_page().unwrap();

        handle.free(p0).unwrap();
        // still 3 pages: p0 isn't the tail, so no truncation happens
        assert_eq!(handle.num_pages(), 3);

        let reused = handle.add_page().unwrap();
        assert_eq!(reused, p0);
        assert_eq!(handle.num_pages(), 3);
    }
}
