//! Page allocation side-channel used by [`super::chunk::ColumnChunk::flush`].
//!
//! Decouples chunk encoding from the buffer pool / shadow WAL: the column
//! store (component E) supplies an allocator backed by the table's data
//! file handle, writing sealed-chunk bytes directly through it. Checkpoint
//! durability for node rows does not route through this allocator or the
//! shadow WAL at all — it comes from `NodeTable::persist`'s separate
//! wholesale row dump (`src/schema.rs`), the same rewrite-whole-file
//! mechanism `CsrTable`/`StatisticsCatalog` already use (see DESIGN.md).

use std::sync::Arc;

use crate::config::PAGE_SIZE;
use crate::error::GraphResult;
use crate::storage::file::PageFileHandle;
use crate::storage::page::zeroed_page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub file_index: u32,
    pub start_page: u64,
    pub num_pages: u64,
}

impl PageRange {
    pub fn empty(file_index: u32) -> Self {
        Self {
            file_index,
            start_page: 0,
            num_pages: 0,
        }
    }
}

pub trait PageAllocator {
    /// Writes `bytes` across as many freshly-appended pages as needed
    /// (zero-padding the last one) and returns the resulting range.
    fn alloc_and_write(&mut self, bytes: &[u8]) -> GraphResult<PageRange>;
}

pub struct FileAllocator {
    pub file_index: u32,
    pub handle: Arc<PageFileHandle>,
}

impl PageAllocator for FileAllocator {
    fn alloc_and_write(&mut self, bytes: &[u8]) -> GraphResult<PageRange> {
        if bytes.is_empty() {
            return Ok(PageRange::empty(self.file_index));
        }
        let num_pages = (bytes.len() + PAGE_SIZE - 1) / PAGE_SIZE;
        let mut start_page = None;
        for i in 0..num_pages {
            let page_index = self.handle.add_page()?;
            if start_page.is_none() {
                start_page = Some(page_index);
            }
            let mut page = zeroed_page();
            let start = i * PAGE_SIZE;
            let end = ((i + 1) * PAGE_SIZE).min(bytes.len());
            page[..end - start].copy_from_slice(&bytes[start..end]);
            self.handle.write(page_index, &page)?;
        }
        Ok(PageRange {
            file_index: self.file_index,
            start_page: start_page.unwrap(),
            num_pages: num_pages as u64,
        })
    }
}
