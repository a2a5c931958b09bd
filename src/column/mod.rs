//! Component D/E: column chunk storage.

pub mod chunk;
pub mod column_store;
pub mod compression;
pub mod null_mask;
pub mod page_allocator;
pub mod types;

pub use chunk::{ColumnChunk, ColumnChunkMetadata, FixedChunk, ListChunk, StringChunk, StructChunk};
pub use column_store::{new_vector, Column, ColumnSchema, LogicalType};
pub use compression::Compression;
pub use null_mask::NullMask;
pub use page_allocator::{FileAllocator, PageAllocator, PageRange};
pub use types::PhysicalType;
