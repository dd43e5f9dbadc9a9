//! Grid coordinates on the torus.
//!
//! Coordinates are signed so that offset arithmetic (a cell plus a
//! direction) can step off the grid before being wrapped back onto it.
//! A coordinate handed out by the lattice always satisfies
//! `0 <= x < width` and `0 <= y < height`.

use std::ops::{Add, Neg, Sub};

/// A cell position on the 2D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coord {
    /// Column
    pub x: i64,
    /// Row
    pub y: i64,
}

impl Coord {
    /// Top-left cell.
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    /// Create a new coordinate.
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Wrap onto a `width × height` torus.
    ///
    /// Uses Euclidean remainder so negative offsets land on the far edge
    /// instead of producing negative coordinates.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero. [`crate::Lattice`] rejects zero
    /// dimensions at construction, so coordinates it wraps never hit this.
    pub const fn wrapped(self, width: u32, height: u32) -> Self {
        Self {
            x: self.x.rem_euclid(width as i64),
            y: self.y.rem_euclid(height as i64),
        }
    }

    /// Whether this coordinate lies on a `width × height` grid without wrapping.
    pub const fn is_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < width as i64 && self.y < height as i64
    }

    /// Shortest wrapped Manhattan distance on a `width × height` torus.
    pub fn torus_distance(&self, other: &Self, width: u32, height: u32) -> u64 {
        let a = self.wrapped(width, height);
        let b = other.wrapped(width, height);
        let dx = (a.x - b.x).unsigned_abs();
        let dy = (a.y - b.y).unsigned_abs();
        dx.min(u64::from(width) - dx) + dy.min(u64::from(height) - dy)
    }
}

impl Add for Coord {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Coord {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Neg for Coord {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl From<(i64, i64)> for Coord {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
