//! Component G: execution-time vectors and their shared selection state.

pub mod data_chunk_state;
pub mod value_vector;

pub use data_chunk_state::{DataChunkState, SelVector};
pub use value_vector::{RunTimeType, ValueVector};
