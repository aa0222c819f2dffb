//! Session-based chunk ingestion and reassembly into one audio stream.

mod chunk_store;
mod combine;
mod probe;

pub use chunk_store::{ChunkError, ChunkStore};
pub use combine::combine_chunks;
pub use probe::probe_duration_secs;
