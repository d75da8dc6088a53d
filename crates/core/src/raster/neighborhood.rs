//! The D8 neighbourhood and its flow-direction encoding
//!
//! Neighbours are always visited in the same scan order, starting east and
//! turning clockwise. The direction code of scan index `i` is `1 << i`, so a
//! single-direction (D8) field and a multi-direction (MFD) bitmask share the
//! same eight bits:
//! ```text
//!    32  64 128
//!    16   0   1
//!     8   4   2
//! ```
//! `0` means no outflow (pit, flat, or no defined share).

use std::f64::consts::SQRT_2;

/// Direction value for a cell without outflow.
pub const NO_FLOW: i32 = 0;

/// One of the eight Moore neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
    North,
    NorthEast,
}

impl Direction {
    /// All directions in scan order. Ties are always broken by this order.
    pub const ALL: [Direction; 8] = [
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
        Direction::North,
        Direction::NorthEast,
    ];

    /// Position in the scan order (0..8)
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Power-of-two direction code
    pub const fn code(self) -> i32 {
        1 << (self as usize)
    }

    /// Decode a single-direction code; `None` for 0, masks, or garbage
    pub fn from_code(code: i32) -> Option<Direction> {
        if code <= 0 || code > 128 || code & (code - 1) != 0 {
            return None;
        }
        Some(Self::ALL[code.trailing_zeros() as usize])
    }

    /// (row_offset, col_offset)
    pub const fn offset(self) -> (isize, isize) {
        match self {
            Direction::East => (0, 1),
            Direction::SouthEast => (1, 1),
            Direction::South => (1, 0),
            Direction::SouthWest => (1, -1),
            Direction::West => (0, -1),
            Direction::NorthWest => (-1, -1),
            Direction::North => (-1, 0),
            Direction::NorthEast => (-1, 1),
        }
    }

    pub const fn is_diagonal(self) -> bool {
        (self as usize) % 2 == 1
    }

    /// Centre-to-centre distance in cell units
    pub fn distance(self) -> f64 {
        if self.is_diagonal() {
            SQRT_2
        } else {
            1.0
        }
    }

    /// Contour-length weight used by the multi-direction model
    pub fn contour_length(self) -> f64 {
        if self.is_diagonal() {
            0.5 * SQRT_2
        } else {
            0.5
        }
    }

    /// Neighbour of (row, col) in this direction, if inside a `rows` x `cols` grid
    #[inline]
    pub fn step(self, row: usize, col: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (dr, dc) = self.offset();
        let nr = row.checked_add_signed(dr)?;
        let nc = col.checked_add_signed(dc)?;
        if nr < rows && nc < cols {
            Some((nr, nc))
        } else {
            None
        }
    }
}

/// Directions whose bit is set in an MFD mask, in scan order
pub fn directions_in_mask(mask: i32) -> impl Iterator<Item = Direction> {
    Direction::ALL
        .into_iter()
        .filter(move |d| mask > 0 && mask & d.code() != 0)
}

/// Iterator over the in-bounds neighbours of a cell, in scan order
pub struct Neighbors {
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
    index: usize,
}

impl Neighbors {
    pub fn new(row: usize, col: usize, rows: usize, cols: usize) -> Self {
        Self {
            row,
            col,
            rows,
            cols,
            index: 0,
        }
    }
}

impl Iterator for Neighbors {
    /// (direction, row, col)
    type Item = (Direction, usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < Direction::ALL.len() {
            let dir = Direction::ALL[self.index];
            self.index += 1;
            if let Some((r, c)) = dir.step(self.row, self.col, self.rows, self.cols) {
                return Some((dir, r, c));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_powers_of_two_in_scan_order() {
        let codes: Vec<i32> = Direction::ALL.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec![1, 2, 4, 8, 16, 32, 64, 128]);
        for d in Direction::ALL {
            assert_eq!(Direction::from_code(d.code()), Some(d));
        }
        assert_eq!(Direction::from_code(0), None);
        assert_eq!(Direction::from_code(3), None);
        assert_eq!(Direction::from_code(-9999), None);
    }

    #[test]
    fn test_mask_decoding() {
        let mask = Direction::East.code() | Direction::South.code();
        let dirs: Vec<_> = directions_in_mask(mask).collect();
        assert_eq!(dirs, vec![Direction::East, Direction::South]);
        assert_eq!(directions_in_mask(-9999).count(), 0);
    }

    #[test]
    fn test_corner_has_three_neighbors() {
        let n: Vec<_> = Neighbors::new(0, 0, 5, 5).collect();
        assert_eq!(n.len(), 3);
        assert_eq!(n[0], (Direction::East, 0, 1));
        assert_eq!(n[1], (Direction::SouthEast, 1, 1));
        assert_eq!(n[2], (Direction::South, 1, 0));
        assert_eq!(Neighbors::new(2, 2, 5, 5).count(), 8);
    }
}
