//! Recursive quad partitioning of a grid
//!
//! A [`Partition`] is a plain rectangle of half-open row and column ranges. It
//! carries no data; the cells it covers are reached through an
//! `ArrayViewMut2` that was carved out of the parent buffer with `split_at`,
//! so sibling partitions can never alias.

use crate::maybe_rayon::join;
use ndarray::{ArrayViewMut2, Axis};

/// Rectangle of cells `[row_start, row_end) x [col_start, col_end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Partition {
    /// The partition covering a whole `rows` x `cols` grid
    pub fn whole(rows: usize, cols: usize) -> Self {
        Self {
            row_start: 0,
            row_end: rows,
            col_start: 0,
            col_end: cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.row_end.saturating_sub(self.row_start)
    }

    pub fn cols(&self) -> usize {
        self.col_end.saturating_sub(self.col_start)
    }

    pub fn cell_count(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }

    /// Whether the global cell (row, col) lies inside
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.row_start..self.row_end).contains(&row) && (self.col_start..self.col_end).contains(&col)
    }

    /// Whether the global cell (row, col) lies on this partition's outer ring
    pub fn on_ring(&self, row: usize, col: usize) -> bool {
        self.contains(row, col)
            && (row == self.row_start
                || row + 1 == self.row_end
                || col == self.col_start
                || col + 1 == self.col_end)
    }

    /// Split into `[north-west, north-east, south-west, south-east]`.
    ///
    /// Each range is cut at `mid = (start + last) / 2` with `mid` kept in the
    /// first half, so odd extents give the extra row or column to the north
    /// or west child. Children may be empty when an extent is 1.
    pub fn quarter(&self) -> [Partition; 4] {
        let row_mid = split_point(self.row_start, self.row_end);
        let col_mid = split_point(self.col_start, self.col_end);

        [
            Partition { row_end: row_mid, col_end: col_mid, ..*self },
            Partition { row_end: row_mid, col_start: col_mid, ..*self },
            Partition { row_start: row_mid, col_end: col_mid, ..*self },
            Partition { row_start: row_mid, col_start: col_mid, ..*self },
        ]
    }

}

/// Exclusive end of the first half of `[start, end)`
fn split_point(start: usize, end: usize) -> usize {
    if end <= start {
        return start;
    }
    let last = end - 1;
    (start + last) / 2 + 1
}

/// Run `solve` on every leaf of the quad tree over `view`.
///
/// `view` must cover exactly `part`. Sibling subtrees run through
/// `join`, each owning a disjoint mutable sub-view. The return values of
/// all leaves are summed.
pub(crate) fn for_each_leaf<T, F>(
    view: ArrayViewMut2<'_, T>,
    part: Partition,
    leaf_cells: usize,
    solve: &F,
) -> usize
where
    T: Send,
    F: Fn(ArrayViewMut2<'_, T>, Partition) -> usize + Sync,
{
    if part.is_empty() {
        return 0;
    }
    if part.cell_count() <= leaf_cells {
        return solve(view, part);
    }

    let [nw, ne, sw, se] = part.quarter();
    let (north, south) = view.split_at(Axis(0), nw.rows());
    let (north_west, north_east) = north.split_at(Axis(1), nw.cols());
    let (south_west, south_east) = south.split_at(Axis(1), sw.cols());

    let ((a, b), (c, d)) = join(
        || {
            join(
                || for_each_leaf(north_west, nw, leaf_cells, solve),
                || for_each_leaf(north_east, ne, leaf_cells, solve),
            )
        },
        || {
            join(
                || for_each_leaf(south_west, sw, leaf_cells, solve),
                || for_each_leaf(south_east, se, leaf_cells, solve),
            )
        },
    );
    a + b + c + d
}
