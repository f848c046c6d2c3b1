use worldupgrader_util::math::{boundingbox::BlockBox, vector2::Vector2};

use super::{ChunkStatus, GenerationState};

/// Answers which blocks around a chunk generation will no longer touch.
///
/// A chunk is safe once it and every chunk within the largest step write radius
/// are [`ChunkStatus::Full`]. Its writable area then widens ring by ring while the
/// chunks beyond are complete too, up to `max_radius` chunks. Chunks that were never
/// generated count as incomplete.
pub struct WritableAreaValidator<G> {
    state: G,
    max_radius: i32,
    min_y: i32,
    max_y: i32,
}

impl<G: GenerationState> WritableAreaValidator<G> {
    pub fn new(state: G, max_radius: u32, min_y: i32, max_y: i32) -> Self {
        Self {
            state,
            max_radius: max_radius.min(i32::MAX as u32) as i32,
            min_y,
            max_y,
        }
    }

    pub fn state(&self) -> &G {
        &self.state
    }

    pub fn writable_area(&self, chunk: Vector2<i32>) -> Option<BlockBox> {
        let write_radius = ChunkStatus::max_write_radius();
        let is_full = |pos: Vector2<i32>| self.state.status(pos) == Some(ChunkStatus::Full);

        // Highest ring such that it and every ring inside it are complete
        let complete = (0..=self.max_radius.saturating_add(write_radius))
            .take_while(|ring| chunk.ring(*ring).all(is_full))
            .last()?;
        if complete < write_radius {
            return None;
        }

        let radius = complete - write_radius;
        Some(BlockBox::from_chunk_columns(
            chunk - Vector2::new(radius, radius),
            chunk + Vector2::new(radius, radius),
            self.min_y + 1,
            self.max_y,
        ))
    }

    /// Whether `chunk` can be rewritten now.
    pub fn is_writable(&self, chunk: Vector2<i32>) -> bool {
        self.writable_area(chunk)
            .is_some_and(|area| area.contains_chunk(chunk))
    }
}
