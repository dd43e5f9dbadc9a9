//! Four-connection neighbor computation.
//!
//! Every cell on the torus has exactly four orthogonal neighbors: there is
//! no boundary, so cells on an edge reach across to the opposite edge.

use crate::{Coord, CONNECTIONS_PER_CELL};

/// An orthogonal direction on the grid.
///
/// `y` grows downward, so North is `y - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// All four directions in query order (N, S, E, W).
    pub const ALL: [Direction; CONNECTIONS_PER_CELL] =
        [Direction::North, Direction::South, Direction::East, Direction::West];

    /// Unit offset for this direction.
    pub const fn offset(self) -> Coord {
        match self {
            Direction::North => Coord { x: 0, y: -1 },
            Direction::South => Coord { x: 0, y: 1 },
            Direction::East => Coord { x: 1, y: 0 },
            Direction::West => Coord { x: -1, y: 0 },
        }
    }
}

/// Neighbor cells of a coordinate on a fixed-size torus.
#[derive(Debug, Clone, Copy)]
pub struct Neighbors;

impl Neighbors {
    /// The four wrapped neighbor cells of `coord`, in N, S, E, W order.
    ///
    /// On grids narrower than three cells several directions can wrap onto
    /// the same cell (or onto `coord` itself); the array keeps them all so
    /// the direction index stays meaningful. `coord` itself may lie off
    /// the grid; it is wrapped before stepping.
    pub fn of(coord: Coord, width: u32, height: u32) -> [Coord; CONNECTIONS_PER_CELL] {
        let home = coord.wrapped(width, height);
        Direction::ALL.map(|dir| (home + dir.offset()).wrapped(width, height))
    }

    /// Distinct neighbor cells of `coord`, excluding `coord` itself.
    pub fn distinct_of(coord: Coord, width: u32, height: u32) -> Vec<Coord> {
        let home = coord.wrapped(width, height);
        let mut cells = Vec::with_capacity(CONNECTIONS_PER_CELL);
        for cell in Self::of(home, width, height) {
            if cell != home && !cells.contains(&cell) {
                cells.push(cell);
            }
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_four_directions() {
        assert_eq!(Direction::ALL.len(), 4);
    }

    #[test]
    fn directions_are_unique() {
        let dirs = Direction::ALL;
        for i in 0..dirs.len() {
            for j in (i + 1)..dirs.len() {
                assert_ne!(dirs[i].offset(), dirs[j].offset());
            }
        }
    }

    #[test]
    fn interior_cell_neighbors() {
        let n = Neighbors::of(Coord::new(5, 5), 10, 10);
        assert_eq!(
            n,
            [Coord::new(5, 4), Coord::new(5, 6), Coord::new(6, 5), Coord::new(4, 5)]
        );
    }

    #[test]
    fn corner_cell_wraps() {
        let n = Neighbors::of(Coord::ORIGIN, 10, 10);
        assert_eq!(
            n,
            [Coord::new(0, 9), Coord::new(0, 1), Coord::new(1, 0), Coord::new(9, 0)]
        );
    }

    #[test]
    fn narrow_grid_deduplicates() {
        // On a 2-wide grid East and West wrap to the same cell.
        let cells = Neighbors::distinct_of(Coord::ORIGIN, 2, 5);
        assert_eq!(cells.len(), 3);

        // A single cell is its own neighbor in every direction.
        assert!(Neighbors::distinct_of(Coord::ORIGIN, 1, 1).is_empty());
    }

    #[test]
    fn far_off_coordinates_do_not_overflow() {
        for coord in [Coord::new(i64::MAX, i64::MIN), Coord::new(i64::MIN, i64::MAX)] {
            for cell in Neighbors::of(coord, 10, 7) {
                assert!(cell.is_within(10, 7), "{cell} off grid for {coord}");
            }
            assert_eq!(
                Neighbors::of(coord, 10, 7),
                Neighbors::of(coord.wrapped(10, 7), 10, 7)
            );
        }
    }
}
