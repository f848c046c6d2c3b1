use std::fmt;
use std::ops::{Add, Sub};

use num_traits::Num;

/// A horizontal pair of coordinates. Chunk and region positions use `Vector2<i32>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Vector2<T> {
    pub x: T,
    pub z: T,
}

impl<T: Num + Copy> Vector2<T> {
    pub const fn new(x: T, z: T) -> Self {
        Vector2 { x, z }
    }
}

impl Vector2<i32> {
    /// Chebyshev distance, the "ring" a position lies on around `other`.
    pub fn chebyshev_distance(&self, other: &Self) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// Every position whose Chebyshev distance to `self` is exactly `radius`.
    pub fn ring(self, radius: i32) -> impl Iterator<Item = Vector2<i32>> {
        (-radius..=radius).flat_map(move |dx| {
            (-radius..=radius).filter_map(move |dz| {
                (dx.abs() == radius || dz.abs() == radius)
                    .then(|| Vector2::new(self.x + dx, self.z + dz))
            })
        })
    }
}

impl<T: Num + Copy> Add for Vector2<T> {
    type Output = Vector2<T>;

    fn add(self, rhs: Self) -> Self::Output {
        Vector2 {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl<T: Num + Copy> Sub for Vector2<T> {
    type Output = Vector2<T>;

    fn sub(self, rhs: Self) -> Self::Output {
        Vector2 {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

impl<T> From<(T, T)> for Vector2<T> {
    #[inline(always)]
    fn from((x, z): (T, T)) -> Self {
        Vector2 { x, z }
    }
}

impl<T: fmt::Display> fmt::Display for Vector2<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}
