//! Component B: fixed-frame buffer pool with clock replacement.
//!
//! Built around a `HashMap<PageID, Arc<RwLock<Page>>>` cache keyed
//! pin/unpin scheme, generalized from heap pages to raw fixed-size byte
//! frames and given a real clock sweep instead of an unbounded map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::debug;

use crate::error::{GraphError, GraphResult};
use crate::storage::file::PageFileHandle;
use crate::storage::page::{zeroed_page, Page, PageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinPolicy {
    /// Load the page from its backing file if it isn't already cached.
    ReadPage,
    /// Leave frame contents undefined; used for newly appended pages that
    /// the caller is about to overwrite in full.
    DontRead,
}

struct Frame {
    page_id: Option<PageId>,
    data: Page,
    pin_count: u32,
    dirty: bool,
    recently_used: bool,
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: None,
            data: zeroed_page(),
            pin_count: 0,
            dirty: false,
            recently_used: false,
        }
    }
}

pub struct BufferPool {
    frames: Vec<Mutex<Frame>>,
    /// page_id -> frame index, guarded separately from the frames
    /// themselves so lookups don't contend with in-flight I/O.
    index: RwLock<HashMap<PageId, usize>>,
    clock_hand: AtomicUsize,
    files: RwLock<HashMap<u32, Arc<PageFileHandle>>>,
}

impl BufferPool {
    pub fn new(frame_count: usize) -> Self {
        let frame_count = frame_count.max(1);
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            frames.push(Mutex::new(Frame::empty()));
        }
        Self {
            frames,
            index: RwLock::new(HashMap::new()),
            clock_hand: AtomicUsize::new(0),
            files: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_file(&self, file_index: u32, handle: Arc<PageFileHandle>) {
        self.files.write().unwrap().insert(file_index, handle);
    }

    fn file_for(&self, file_index: u32) -> GraphResult<Arc<PageFileHandle>> {
        self.files
            .read()
            .unwrap()
            .get(&file_index)
            .cloned()
            .ok_or_else(|| GraphError::internal(format!("no file registered at index {}", file_index)))
    }

    /// Pins `page_id`, loading it per `policy` on a miss. Returns the frame
    /// index; callers read/write through [`BufferPool::with_frame`] /
    /// [`BufferPool::with_frame_mut`].
    pub fn pin(&self, page_id: PageId, policy: PinPolicy) -> GraphResult<usize> {
        if let Some(&idx) = self.index.read().unwrap().get(&page_id) {
            let mut frame = self.frames[idx].lock().unwrap();
            frame.pin_count += 1;
            frame.recently_used = true;
            return Ok(idx);
        }

        let idx = self.find_victim()?;
        {
            let mut frame = self.frames[idx].lock().unwrap();
            if frame.dirty {
                self.write_back(&frame)?;
            }
            if let Some(old_id) = frame.page_id.take() {
                self.index.write().unwrap().remove(&old_id);
            }
            if policy == PinPolicy::ReadPage {
                let file = self.file_for(page_id.file_index)?;
                file.read(page_id.page_index, &mut frame.data)?;
            } else {
                frame.data = zeroed_page();
            }
            frame.page_id = Some(page_id);
            frame.pin_count = 1;
            frame.dirty = false;
            frame.recently_used = true;
        }
        self.index.write().unwrap().insert(page_id, idx);
        debug!("pinned {} into frame {}", page_id, idx);
        Ok(idx)
    }

    /// One clock sweep: skip pinned frames, clear-and-advance on
    /// `recently_used`, otherwise evict. Fails with `OutOfBuffer` if no
    /// frame is evictable after a full sweep.
    fn find_victim(&self) -> GraphResult<usize> {
        let n = self.frames.len();
        for _ in 0..(2 * n) {
            let idx = self.clock_hand.fetch_add(1, Ordering::Relaxed) % n;
            let mut frame = self.frames[idx].lock().unwrap();
            if frame.pin_count > 0 {
                continue;
            }
            if frame.recently_used {
                frame.recently_used = false;
                continue;
            }
            return Ok(idx);
        }
        Err(GraphError::out_of_buffer())
    }

    fn write_back(&self, frame: &Frame) -> GraphResult<()> {
        if let Some(page_id) = frame.page_id {
            let file = self.file_for(page_id.file_index)?;
            file.write(page_id.page_index, &frame.data)?;
        }
        Ok(())
    }

    /// Decrements the pin count; at zero the frame becomes evictable.
    pub fn unpin(&self, page_id: PageId) {
        if let Some(&idx) = self.index.read().unwrap().get(&page_id) {
            let mut frame = self.frames[idx].lock().unwrap();
            if frame.pin_count > 0 {
                frame.pin_count -= 1;
            }
        }
    }

    pub fn set_pinned_dirty(&self, page_id: PageId) {
        if let Some(&idx) = self.index.read().unwrap().get(&page_id) {
            self.frames[idx].lock().unwrap().dirty = true;
        }
    }

    pub fn with_frame<R>(&self, page_id: PageId, f: impl FnOnce(&Page) -> R) -> GraphResult<R> {
        let idx = *self
            .index
            .read()
            .unwrap()
            .get(&page_id)
            .ok_or_else(|| GraphError::internal(format!("{} not pinned", page_id)))?;
        let frame = self.frames[idx].lock().unwrap();
        Ok(f(&frame.data))
    }

    pub fn with_frame_mut<R>(&self, page_id: PageId, f: impl FnOnce(&mut Page) -> R) -> GraphResult<R> {
        let idx = *self
            .index
            .read()
            .unwrap()
            .get(&page_id)
            .ok_or_else(|| GraphError::internal(format!("{} not pinned", page_id)))?;
        let mut frame = self.frames[idx].lock().unwrap();
        let r = f(&mut frame.data);
        frame.dirty = true;
        Ok(r)
    }

    /// Short lock-free-ish read for hot scans: since frames are guarded by
    /// per-frame mutexes rather than a seqlock, this simply takes the lock
    /// briefly and retries if the page was evicted out from under the
    /// caller between the index lookup and the lock acquisition.
    pub fn optimistic_read<R>(&self, page_id: PageId, f: impl Fn(&Page) -> R) -> GraphResult<R> {
        loop {
            let idx = *self
                .index
                .read()
                .unwrap()
                .get(&page_id)
                .ok_or_else(|| GraphError::internal(format!("{} not pinned", page_id)))?;
            let frame = self.frames[idx].lock().unwrap();
            if frame.page_id == Some(page_id) {
                return Ok(f(&frame.data));
            }
            // lost the race against eviction; retry
        }
    }

    /// Flushes every dirty pinned-or-cached page for the given predicate
    /// (used by checkpoint / transaction commit). Pages not currently
    /// resident are, by construction, already durable.
    pub fn flush_all_dirty(&self) -> GraphResult<()> {
        for (idx, frame_lock) in self.frames.iter().enumerate() {
            let mut frame = frame_lock.lock().unwrap();
            if frame.dirty {
                self.write_back(&frame)?;
                frame.dirty = false;
                debug!("flushed frame {}", idx);
            }
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[cfg(test)]
    pub(crate) fn pin_count_for(&self, page_id: PageId) -> Option<u32> {
        let idx = *self.index.read().unwrap().get(&page_id)?;
        Some(self.frames[idx].lock().unwrap().pin_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::DbFileKind;
    use tempfile::tempdir;

    fn setup(frame_count: usize) -> (BufferPool, Arc<PageFileHandle>) {
        let dir = tempdir().unwrap();
        let handle = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        let pool = BufferPool::new(frame_count);
        pool.register_file(0, handle.clone());
        // leak the tempdir so the file stays alive for the test's duration
        std::mem::forget(dir);
        (pool, handle)
    }

    #[test]
    fn pin_miss_loads_from_file_and_evicts_under_pressure() {
        let (pool, handle) = setup(2);
        let p0 = handle.add_page().unwrap();
        let p1 = handle.add_page().unwrap();
        let p2 = handle.add_page().unwrap();

        let id0 = PageId::new(0, p0);
        let id1 = PageId::new(0, p1);
        let id2 = PageId::new(0, p2);

        pool.pin(id0, PinPolicy::ReadPage).unwrap();
        pool.pin(id1, PinPolicy::ReadPage).unwrap();
        pool.unpin(id0);
        pool.unpin(id1);

        // both frames are unpinned but "recently_used"; one full sweep
        // clears the flags, the next evicts one to make room for id2.
        pool.pin(id2, PinPolicy::ReadPage).unwrap();
        assert_eq!(pool.frame_count(), 2);
        let _ = DbFileKind::Data;
    }

    #[test]
    fn out_of_buffer_when_all_pinned() {
        let (pool, handle) = setup(1);
        let p0 = handle.add_page().unwrap();
        let p1 = handle.add_page().unwrap();
        let id0 = PageId::new(0, p0);
        let id1 = PageId::new(0, p1);

        pool.pin(id0, PinPolicy::ReadPage).unwrap();
        let err = pool.pin(id1, PinPolicy::ReadPage).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OutOfBuffer);

        pool.unpin(id0);
        pool.pin(id1, PinPolicy::ReadPage).unwrap();
    }

    #[test]
    fn dirty_frame_is_written_back_on_eviction() {
        let (pool, handle) = setup(1);
        let p0 = handle.add_page().unwrap();
        let p1 = handle.add_page().unwrap();
        let id0 = PageId::new(0, p0);
        let id1 = PageId::new(0, p1);

        pool.pin(id0, PinPolicy::ReadPage).unwrap();
        pool.with_frame_mut(id0, |buf| buf[0] = 7).unwrap();
        pool.unpin(id0);

        pool.pin(id1, PinPolicy::ReadPage).unwrap();
        pool.unpin(id1);

        let mut raw = zeroed_page();
        handle.read(p0, &mut raw).unwrap();
        assert_eq!(raw[0], 7);
    }
}
