//! Component C: shadow-paging WAL.
//!
//! A dedicated shadow file holding copies of modified pages, plus an
//! in-memory map from `(original file, original page)` to the shadow slot
//! that holds its pending content. Encoding follows the hand-rolled
//! `Encodeable`/`Decodeable` pair (`src/io.rs`) rather than `serde`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, info};

use crate::config::PAGE_SIZE;
use crate::error::{GraphError, GraphResult};
use crate::io::{Decodeable, Encodeable};
use crate::storage::file::PageFileHandle;
use crate::storage::page::{zeroed_page, DbFileId, DbFileKind, Page};

const MAGIC: u32 = 0x5344_4257; // "SDBW"
const VERSION: u32 = 1;
const HEADER_SIZE: u64 = 4 + 4 + 8; // magic + version + num_shadow_pages

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowPageRecord {
    pub db_file_id: DbFileId,
    pub original_file_index: u32,
    pub original_page_index: u64,
}

impl Encodeable for ShadowPageRecord {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(encode_db_file_kind(self.db_file_id.kind));
        out.extend(self.db_file_id.table_id.encode());
        out.extend(self.original_file_index.encode());
        out.extend(self.original_page_index.encode());
        out
    }
}

impl Decodeable for ShadowPageRecord {
    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let kind = decode_db_file_kind(reader)?;
        let table_id = u64::decode_from(reader)?;
        let original_file_index = u32::decode_from(reader)?;
        let original_page_index = u64::decode_from(reader)?;
        Ok(Self {
            db_file_id: DbFileId::new(kind, table_id),
            original_file_index,
            original_page_index,
        })
    }
}

fn encode_db_file_kind(kind: DbFileKind) -> Vec<u8> {
    let tag: u8 = match kind {
        DbFileKind::Data => 0,
        DbFileKind::Metadata => 1,
        DbFileKind::Catalog => 2,
        DbFileKind::NodeStats => 3,
        DbFileKind::RelStats => 4,
        DbFileKind::Index => 5,
    };
    vec![tag]
}

fn decode_db_file_kind<R: Read>(reader: &mut R) -> std::io::Result<DbFileKind> {
    let tag = u8::decode_from(reader)?;
    Ok(match tag {
        0 => DbFileKind::Data,
        1 => DbFileKind::Metadata,
        2 => DbFileKind::Catalog,
        3 => DbFileKind::NodeStats,
        4 => DbFileKind::RelStats,
        _ => DbFileKind::Index,
    })
}

struct ShadowWalInner {
    file: File,
    num_shadow_pages: u64,
    /// (original_file_index, original_page_index) -> shadow_page_index
    map: HashMap<(u32, u64), u64>,
    records: Vec<ShadowPageRecord>,
}

/// A dedicated shadow file plus the in-memory map described in spec §4.C.
pub struct ShadowWal {
    inner: Mutex<ShadowWalInner>,
    /// Original files this WAL can replay into, keyed by the same
    /// `file_index` the buffer pool uses.
    files: RwLock<HashMap<u32, Arc<PageFileHandle>>>,
}

impl ShadowWal {
    pub fn open(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        if is_new {
            file.set_len(HEADER_SIZE)?;
            write_header(&mut file, 0)?;
        }

        let num_shadow_pages = read_header(&mut file)?;
        let records = read_records(&mut file, num_shadow_pages)?;
        let mut map = HashMap::new();
        for (slot, record) in records.iter().enumerate() {
            map.insert(
                (record.original_file_index, record.original_page_index),
                slot as u64,
            );
        }

        Ok(Self {
            inner: Mutex::new(ShadowWalInner {
                file,
                num_shadow_pages,
                map,
                records,
            }),
            files: RwLock::new(HashMap::new()),
        })
    }

    pub fn register_file(&self, file_index: u32, handle: Arc<PageFileHandle>) {
        self.files.write().unwrap().insert(file_index, handle);
    }

    pub fn num_shadow_pages(&self) -> u64 {
        self.inner.lock().unwrap().num_shadow_pages
    }

    fn file_for(&self, file_index: u32) -> GraphResult<Arc<PageFileHandle>> {
        self.files
            .read()
            .unwrap()
            .get(&file_index)
            .cloned()
            .ok_or_else(|| GraphError::internal(format!("no original file registered at index {}", file_index)))
    }

    /// Returns the shadow slot index for `(file, original_page)`, creating
    /// one (and copying the original page's current content into it, if the
    /// original page exists) when none exists yet.
    pub fn get_or_create_shadow(
        &self,
        db_file_id: DbFileId,
        file_index: u32,
        original_page: u64,
    ) -> GraphResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(&slot) = inner.map.get(&(file_index, original_page)) {
            return Ok(slot);
        }

        let slot = inner.num_shadow_pages;
        let mut content = zeroed_page();
        drop(inner);
        if let Ok(original_file) = self.file_for(file_index) {
            if original_page < original_file.num_pages() {
                original_file.read(original_page, &mut content)?;
            }
        }
        let mut inner = self.inner.lock().unwrap();

        write_shadow_page(&mut inner.file, slot, &content)?;
        inner.num_shadow_pages += 1;
        inner.map.insert((file_index, original_page), slot);
        inner.records.push(ShadowPageRecord {
            db_file_id,
            original_file_index: file_index,
            original_page_index: original_page,
        });
        debug!(
            "created shadow page {} for file={} page={}",
            slot, file_index, original_page
        );
        Ok(slot)
    }

    pub fn has_shadow(&self, file_index: u32, original_page: u64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .map
            .contains_key(&(file_index, original_page))
    }

    pub fn read_shadow_page(&self, slot: u64, buf: &mut Page) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        read_shadow_page(&mut inner.file, slot, buf)
    }

    pub fn write_shadow_page(&self, slot: u64, buf: &Page) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        write_shadow_page(&mut inner.file, slot, buf)
    }

    /// fsyncs the shadow file, including the header and record trailer.
    pub fn flush_all(&self) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        write_header(&mut inner.file, inner.num_shadow_pages)?;
        let num_shadow_pages = inner.num_shadow_pages;
        let records = inner.records.clone();
        write_records(&mut inner.file, num_shadow_pages, &records)?;
        inner.file.flush()?;
        inner.file.sync_all()?;
        info!("shadow WAL flushed: {} shadow pages", inner.num_shadow_pages);
        Ok(())
    }

    /// Copies every shadow page back onto its original position, then
    /// fsyncs the affected original files. Call [`ShadowWal::clear_all`]
    /// afterwards to complete the checkpoint.
    pub fn replay(&self) -> GraphResult<()> {
        let records = {
            let inner = self.inner.lock().unwrap();
            inner.records.clone()
        };
        let mut touched: Vec<Arc<PageFileHandle>> = Vec::new();
        for (slot, record) in records.iter().enumerate() {
            let mut content = zeroed_page();
            {
                let mut inner = self.inner.lock().unwrap();
                read_shadow_page(&mut inner.file, slot as u64, &mut content)?;
            }
            let original_file = self.file_for(record.original_file_index)?;
            while original_file.num_pages() <= record.original_page_index {
                original_file.add_page()?;
            }
            original_file.write(record.original_page_index, &content)?;
            touched.push(original_file);
        }
        for file in touched {
            file.flush()?;
        }
        info!("shadow WAL replayed {} records", records.len());
        Ok(())
    }

    /// Discards the map, empties the record vector, and truncates the
    /// shadow file back to just its header.
    pub fn clear_all(&self) -> GraphResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.records.clear();
        inner.num_shadow_pages = 0;
        inner.file.set_len(HEADER_SIZE)?;
        write_header(&mut inner.file, 0)?;
        inner.file.flush()?;
        Ok(())
    }

    /// `(1) write shadow pages` is implicit in `get_or_create_shadow`;
    /// this runs steps `(2)-(5)` of the checkpoint contract in spec §4.C.
    pub fn checkpoint(&self) -> GraphResult<()> {
        self.flush_all()?;
        self.replay()?;
        self.clear_all()
    }
}

fn write_header(file: &mut File, num_shadow_pages: u64) -> GraphResult<()> {
    let mut buf = Vec::with_capacity(HEADER_SIZE as usize);
    buf.extend(MAGIC.encode());
    buf.extend(VERSION.encode());
    buf.extend(num_shadow_pages.encode());
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&buf)?;
    Ok(())
}

fn read_header(file: &mut File) -> GraphResult<u64> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut buf)?;
    let mut cursor = Cursor::new(&buf[..]);
    let magic = u32::decode_from(&mut cursor)?;
    let _version = u32::decode_from(&mut cursor)?;
    if magic != MAGIC {
        return Err(GraphError::invalid_input("bad shadow WAL magic"));
    }
    Ok(u64::decode_from(&mut cursor)?)
}

fn shadow_page_offset(slot: u64) -> u64 {
    HEADER_SIZE + slot * PAGE_SIZE as u64
}

fn write_shadow_page(file: &mut File, slot: u64, buf: &Page) -> GraphResult<()> {
    file.seek(SeekFrom::Start(shadow_page_offset(slot)))?;
    file.write_all(buf)?;
    Ok(())
}

fn read_shadow_page(file: &mut File, slot: u64, buf: &mut Page) -> GraphResult<()> {
    file.seek(SeekFrom::Start(shadow_page_offset(slot)))?;
    file.read_exact(buf)?;
    Ok(())
}

fn write_records(file: &mut File, num_shadow_pages: u64, records: &[ShadowPageRecord]) -> GraphResult<()> {
    let trailer_offset = shadow_page_offset(num_shadow_pages);
    file.seek(SeekFrom::Start(trailer_offset))?;
    file.write_all(&records.to_vec().encode())?;
    let end = file.stream_position()?;
    file.set_len(end)?;
    Ok(())
}

fn read_records(file: &mut File, num_shadow_pages: u64) -> GraphResult<Vec<ShadowPageRecord>> {
    let trailer_offset = shadow_page_offset(num_shadow_pages);
    let len = file.metadata()?.len();
    if len <= trailer_offset {
        return Ok(Vec::new());
    }
    file.seek(SeekFrom::Start(trailer_offset))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    let mut cursor = Cursor::new(bytes);
    Vec::<ShadowPageRecord>::decode_from(&mut cursor).map_err(GraphError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::DbFileKind;
    use tempfile::tempdir;

    #[test]
    fn create_flush_replay_clear_roundtrip() {
        let dir = tempdir().unwrap();
        let original = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        let p0 = original.add_page().unwrap();

        let wal = ShadowWal::open(dir.path().join("wal.bin")).unwrap();
        wal.register_file(0, original.clone());

        let slot = wal
            .get_or_create_shadow(DbFileId::new(DbFileKind::Data, 0), 0, p0)
            .unwrap();
        let mut shadow_content = zeroed_page();
        shadow_content[0] = 99;
        wal.write_shadow_page(slot, &shadow_content).unwrap();
        wal.flush_all().unwrap();
        assert_eq!(wal.num_shadow_pages(), 1);

        wal.checkpoint().unwrap();
        assert_eq!(wal.num_shadow_pages(), 0);

        let mut readback = zeroed_page();
        original.read(p0, &mut readback).unwrap();
        assert_eq!(readback[0], 99);
    }

    #[test]
    fn replay_then_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let original = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        original.add_page().unwrap();

        let wal = ShadowWal::open(dir.path().join("wal.bin")).unwrap();
        wal.register_file(0, original.clone());

        wal.replay().unwrap();
        wal.clear_all().unwrap();
        wal.replay().unwrap();
        wal.clear_all().unwrap();
        assert_eq!(wal.num_shadow_pages(), 0);
    }

    #[test]
    fn reopen_recovers_pending_shadow_pages() {
        let dir = tempdir().unwrap();
        let original = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        let p0 = original.add_page().unwrap();
        let wal_path = dir.path().join("wal.bin");

        {
            let wal = ShadowWal::open(&wal_path).unwrap();
            wal.register_file(0, original.clone());
            let slot = wal
                .get_or_create_shadow(DbFileId::new(DbFileKind::Data, 0), 0, p0)
                .unwrap();
            let mut content = zeroed_page();
            content[1] = 5;
            wal.write_shadow_page(slot, &content).unwrap();
            wal.flush_all().unwrap();
        }

        // simulate a crash after fsync but before replay/clear
        let wal = ShadowWal::open(&wal_path).unwrap();
        wal.register_file(0, original.clone());
        assert_eq!(wal.num_shadow_pages(), 1);
        wal.checkpoint().unwrap();

        let mut readback = zeroed_page();
        original.read(p0, &mut readback).unwrap();
        assert_eq!(readback[1], 5);
    }
}
