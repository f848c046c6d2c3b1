use std::fmt;

use super::{chunk_to_block, position::BlockPos, vector2::Vector2, vector3::Vector3};

/// An inclusive, axis-aligned box of block positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockBox {
    pub min: Vector3<i32>,
    pub max: Vector3<i32>,
}

impl BlockBox {
    /// Builds a box from two opposite corners in any order.
    pub fn new(a: Vector3<i32>, b: Vector3<i32>) -> Self {
        Self {
            min: Vector3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vector3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// The columns of every chunk from `min_chunk` to `max_chunk`, between `min_y` and `max_y`.
    pub fn from_chunk_columns(
        min_chunk: Vector2<i32>,
        max_chunk: Vector2<i32>,
        min_y: i32,
        max_y: i32,
    ) -> Self {
        Self::new(
            Vector3::new(chunk_to_block(min_chunk.x), min_y, chunk_to_block(min_chunk.z)),
            Vector3::new(
                chunk_to_block(max_chunk.x) + 15,
                max_y,
                chunk_to_block(max_chunk.z) + 15,
            ),
        )
    }

    pub fn encapsulate(&self, other: &Self) -> Self {
        Self {
            min: Vector3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vector3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    pub fn is_inside(&self, pos: &BlockPos) -> bool {
        let pos = pos.0;
        (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }

    pub fn contains_box(&self, other: &Self) -> bool {
        self.is_inside(&BlockPos(other.min)) && self.is_inside(&BlockPos(other.max))
    }

    /// Whether the whole horizontal footprint of `chunk` lies inside the box.
    pub fn contains_chunk(&self, chunk: Vector2<i32>) -> bool {
        let min_x = chunk_to_block(chunk.x);
        let min_z = chunk_to_block(chunk.z);
        min_x >= self.min.x
            && min_x + 15 <= self.max.x
            && min_z >= self.min.z
            && min_z + 15 <= self.max.z
    }
}

impl fmt::Display for BlockBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::BlockBox;
    use crate::math::{position::BlockPos, vector2::Vector2, vector3::Vector3};

    #[test]
    fn chunk_columns_cover_whole_chunks() {
        let area = BlockBox::from_chunk_columns(Vector2::new(-1, 0), Vector2::new(1, 2), -63, 319);
        assert_eq!(area.min, Vector3::new(-16, -63, 0));
        assert_eq!(area.max, Vector3::new(31, 319, 47));
        assert!(area.contains_chunk(Vector2::new(0, 1)));
        assert!(!area.contains_chunk(Vector2::new(2, 1)));
        assert!(!area.is_inside(&BlockPos::new(0, -64, 0)));
    }

    #[test]
    fn encapsulate_grows_to_both() {
        let a = BlockBox::new(Vector3::new(0, 0, 0), Vector3::new(1, 1, 1));
        let b = BlockBox::new(Vector3::new(5, -2, 3), Vector3::new(4, 0, 3));
        let both = a.encapsulate(&b);
        assert!(both.contains_box(&a));
        assert!(both.contains_box(&b));
        assert_eq!(both.min, Vector3::new(0, -2, 0));
    }
}
