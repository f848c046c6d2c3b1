use std::time::Duration;

use log::{info, warn};
use worldupgrader_util::math::vector2::Vector2;
use worldupgrader_world::level::Dimension;

/// What one dimension's upgrade pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelReport {
    pub dimension: Dimension,
    pub chunks_rewritten: usize,
    pub entity_sections_rewritten: usize,
    pub entities_rewritten: usize,
    /// Rewritten entities whose position lies outside their section.
    pub misplaced_entities: usize,
    /// Chunks left alone because generation around them is not finished.
    pub deferred_chunks: Vec<Vector2<i32>>,
    pub deferred_entity_sections: Vec<Vector2<i32>>,
}

impl LevelReport {
    pub fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            chunks_rewritten: 0,
            entity_sections_rewritten: 0,
            entities_rewritten: 0,
            misplaced_entities: 0,
            deferred_chunks: Vec::new(),
            deferred_entity_sections: Vec::new(),
        }
    }

    pub fn deferred(&self) -> usize {
        self.deferred_chunks.len() + self.deferred_entity_sections.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Names of the applied upgrade sets.
    pub sets: Vec<String>,
    pub levels: Vec<LevelReport>,
    pub elapsed: Duration,
}

impl UpgradeReport {
    pub fn level(&self, dimension: Dimension) -> Option<&LevelReport> {
        self.levels.iter().find(|level| level.dimension == dimension)
    }

    pub fn chunks_rewritten(&self) -> usize {
        self.levels.iter().map(|level| level.chunks_rewritten).sum()
    }

    pub fn entity_sections_rewritten(&self) -> usize {
        self.levels
            .iter()
            .map(|level| level.entity_sections_rewritten)
            .sum()
    }

    pub fn log(&self) {
        for level in &self.levels {
            info!(
                "{}: rewrote {} chunks and {} entity sections ({} entities)",
                level.dimension,
                level.chunks_rewritten,
                level.entity_sections_rewritten,
                level.entities_rewritten
            );
            if level.misplaced_entities > 0 {
                warn!(
                    "{}: {} entities are stored in a section they do not stand in",
                    level.dimension, level.misplaced_entities
                );
            }
            if level.deferred() > 0 {
                warn!(
                    "{}: deferred {} chunks and {} entity sections whose surroundings are still generating",
                    level.dimension,
                    level.deferred_chunks.len(),
                    level.deferred_entity_sections.len()
                );
            }
        }
        info!(
            "World upgrade with {} took {}ms",
            self.sets.join(", "),
            self.elapsed.as_millis()
        );
    }
}
