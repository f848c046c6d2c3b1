pub mod boundingbox;
pub mod position;
pub mod vector2;
pub mod vector3;

/// Converts a block coordinate to the coordinate of the chunk containing it.
pub const fn block_to_chunk(coord: i32) -> i32 {
    coord >> 4
}

/// Returns the lowest block coordinate inside the given chunk coordinate.
pub const fn chunk_to_block(coord: i32) -> i32 {
    coord << 4
}
