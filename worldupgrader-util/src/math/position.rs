use std::fmt;

use super::{block_to_chunk, vector2::Vector2, vector3::Vector3};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// Aka Block Position
pub struct BlockPos(pub Vector3<i32>);

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self(Vector3::new(x, y, z))
    }

    pub fn floored(x: f64, y: f64, z: f64) -> Self {
        Self(Vector3::new(
            x.floor() as i32,
            y.floor() as i32,
            z.floor() as i32,
        ))
    }

    /// The chunk column this block belongs to.
    pub const fn chunk_position(&self) -> Vector2<i32> {
        Vector2::new(block_to_chunk(self.0.x), block_to_chunk(self.0.z))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.0.x, self.0.y, self.0.z)
    }
}

#[cfg(test)]
mod tests {
    use super::BlockPos;
    use crate::math::vector2::Vector2;

    #[test]
    fn floored_negative_position_lands_in_negative_chunk() {
        let pos = BlockPos::floored(-0.5, 64.2, 31.9);
        assert_eq!(pos, BlockPos::new(-1, 64, 31));
        assert_eq!(pos.chunk_position(), Vector2::new(-1, 1));
    }
}
