//! The generation pipeline as seen by the upgrader: per-chunk completion state and
//! the area that is safe to rewrite.

mod status;
mod writable_area;

pub use status::{ChunkStatus, ChunkStatusMap, GenerationState};
pub use writable_area::WritableAreaValidator;
