//! Hybrid D8/MFD flow direction
//!
//! Steep cells route all of their flow to one neighbour (D8). Gentle cells
//! weigh every strictly lower neighbour by
//!
//! ```text
//! d_i = tan(slope_i)^5 * L_i
//! ```
//!
//! where `slope_i` is the neighbour's own slope and `L_i` the contour length
//! of the shared edge (0.5 orthogonal, 0.5·√2 diagonal). Directions holding at
//! least half of the total weight are recorded as bits of a mask, using the
//! same codes as D8.

use ndarray::Array2;

use super::flow_direction::direction_nodata;
use crate::maybe_rayon::*;
use crate::terrain::{STEEP, STEEPNESS_NODATA};
use hydroflow_core::raster::{Direction, Neighbors, Raster, RasterElement, NO_FLOW};
use hydroflow_core::{Error, Result};

/// Exponent applied to the neighbour slope tangent
pub const SLOPE_EXPONENT: i32 = 5;

/// Minimum normalized share for a direction to be recorded
pub const SHARE_THRESHOLD: f64 = 0.5;

/// Compute hybrid flow directions from a filled DEM.
///
/// `slope` is in degrees and `steep` is a mask from
/// [`classify_steepness`](crate::terrain::classify_steepness). Cells that are
/// NODATA in `filled`, NaN in `slope` or NODATA in `steep` get the direction
/// NODATA, which is the DEM's NODATA (or the `i32` default when the DEM has
/// none).
///
/// # Errors
/// - `Error::SizeMismatch` naming `slope` or `steepness` when a raster's
///   shape differs from `filled`
/// - `Error::InvalidParameter` when the DEM's NODATA lies in `0..=255`
pub fn flow_direction_hybrid(
    slope: &Raster<f64>,
    filled: &Raster<i32>,
    steep: &Raster<u8>,
) -> Result<Raster<i32>> {
    filled.check_shape("slope", slope)?;
    filled.check_shape("steepness", steep)?;

    let (rows, cols) = filled.shape();
    let nodata = direction_nodata(filled)?.unwrap_or_else(i32::default_nodata);

    let output_data: Vec<i32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NO_FLOW; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                *out = match cell_class(slope, filled, steep, row, col) {
                    CellClass::NoData => nodata,
                    CellClass::Steep => steepest_drop(filled, row, col).map_or(NO_FLOW, Direction::code),
                    CellClass::Gentle => share_mask(&transfer_shares(slope, filled, row, col)),
                };
            }

            row_data
        })
        .collect();

    let mut output = filled.with_same_meta::<i32>();
    output.set_nodata(Some(nodata));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// Normalized transfer shares from a cell to each neighbour, in scan order.
///
/// Only valid, strictly lower neighbours with a defined slope receive weight.
/// When the cell is invalid or no neighbour qualifies, every share is zero;
/// otherwise the shares sum to 1.
pub fn transfer_shares(slope: &Raster<f64>, filled: &Raster<i32>, row: usize, col: usize) -> [f64; 8] {
    let mut shares = [0.0; 8];
    if !filled.is_valid(row, col) {
        return shares;
    }

    let (rows, cols) = filled.shape();
    let z = filled.data();
    let s = slope.data();
    let center = z[(row, col)];

    let mut total = 0.0;
    for (dir, nr, nc) in Neighbors::new(row, col, rows, cols) {
        if !filled.is_valid(nr, nc) || z[(nr, nc)] >= center {
            continue;
        }
        let Some(&neighbor_slope) = s.get((nr, nc)) else {
            continue;
        };
        if neighbor_slope.is_nan() {
            continue;
        }

        let weight = neighbor_slope.to_radians().tan().powi(SLOPE_EXPONENT) * dir.contour_length();
        shares[dir.index()] = weight;
        total += weight;
    }

    if total > 0.0 {
        for share in shares.iter_mut() {
            *share /= total;
        }
    }
    shares
}

/// Bitmask of the directions whose share reaches [`SHARE_THRESHOLD`]
pub(crate) fn share_mask(shares: &[f64; 8]) -> i32 {
    Direction::ALL
        .iter()
        .filter(|d| {
            let share = shares[d.index()];
            share > 0.0 && share >= SHARE_THRESHOLD
        })
        .fold(NO_FLOW, |mask, d| mask | d.code())
}

/// Strictly lower valid neighbour with the largest elevation drop.
///
/// Ties go to the first neighbour in scan order.
pub(crate) fn steepest_drop(filled: &Raster<i32>, row: usize, col: usize) -> Option<Direction> {
    let (rows, cols) = filled.shape();
    let z = filled.data();
    let center = z[(row, col)];

    let mut best: Option<(Direction, i64)> = None;
    for (dir, nr, nc) in Neighbors::new(row, col, rows, cols) {
        if !filled.is_valid(nr, nc) {
            continue;
        }
        let drop = i64::from(center) - i64::from(z[(nr, nc)]);
        if drop > 0 && best.map_or(true, |(_, b)| drop > b) {
            best = Some((dir, drop));
        }
    }
    best.map(|(dir, _)| dir)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellClass {
    NoData,
    Steep,
    Gentle,
}

pub(crate) fn cell_class(
    slope: &Raster<f64>,
    filled: &Raster<i32>,
    steep: &Raster<u8>,
    row: usize,
    col: usize,
) -> CellClass {
    let slope_missing = slope.data().get((row, col)).map_or(true, |s| s.is_nan());
    match steep.data().get((row, col)) {
        _ if !filled.is_valid(row, col) || slope_missing => CellClass::NoData,
        Some(&STEEP) => CellClass::Steep,
        Some(&STEEPNESS_NODATA) | None => CellClass::NoData,
        Some(_) => CellClass::Gentle,
    }
}
