//! D8 flow direction algorithm
//!
//! Each cell points at its lowest neighbour when that neighbour is strictly
//! lower, using the power-of-two codes of [`Direction`]:
//! ```text
//!   32  64  128
//!   16   0    1
//!    8   4    2
//! ```
//! 0 = pit or flat (no strictly lower neighbour). Ties between equally low
//! neighbours go to the first one in scan order (E, SE, S, SW, W, NW, N, NE).
//!
//! Filling turns pits into flats, which plain D8 leaves without outflow.
//! [`resolve_filled_flats`] routes those flats toward their outlet.

use std::collections::VecDeque;

use ndarray::Array2;
use tracing::debug;

use crate::maybe_rayon::*;
use hydroflow_core::raster::{Direction, Neighbors, Raster, NO_FLOW};
use hydroflow_core::{Algorithm, Error, Result};

/// Flow direction algorithm (D8)
#[derive(Debug, Clone, Default)]
pub struct FlowDirection;

impl Algorithm for FlowDirection {
    type Input = Raster<i32>;
    type Output = Raster<i32>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Direction (D8)"
    }

    fn description(&self) -> &'static str {
        "Calculate D8 flow direction from a filled DEM"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_direction_d8(&input)
    }
}

/// NODATA value for a direction raster derived from `dem`.
///
/// Direction rasters reuse the DEM's NODATA, which must not collide with
/// the codes and masks in `0..=255`.
pub(crate) fn direction_nodata(dem: &Raster<i32>) -> Result<Option<i32>> {
    match dem.nodata() {
        Some(nd) if (0..=255).contains(&nd) => Err(Error::InvalidParameter {
            name: "nodata",
            value: nd.to_string(),
            reason: "collides with flow direction codes 0..=255".into(),
        }),
        nd => Ok(nd),
    }
}

/// Calculate D8 flow direction from a DEM.
///
/// The input DEM should be hydrologically conditioned (depressions filled)
/// for meaningful results. NODATA cells carry the DEM's NODATA value.
///
/// # Errors
/// `Error::InvalidParameter` when the DEM's NODATA lies in `0..=255`.
pub fn flow_direction_d8(dem: &Raster<i32>) -> Result<Raster<i32>> {
    let (rows, cols) = dem.shape();
    let nodata = direction_nodata(dem)?;

    let output_data: Vec<i32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![NO_FLOW; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                if !dem.is_valid(row, col) {
                    *out = nodata.unwrap_or(NO_FLOW);
                    continue;
                }
                *out = d8_code(dem, row, col);
            }

            row_data
        })
        .collect();

    let mut output = dem.with_same_meta::<i32>();
    output.set_nodata(nodata);
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// Code of the lowest strictly-lower valid neighbour of a valid cell, or `NO_FLOW`.
fn d8_code(dem: &Raster<i32>, row: usize, col: usize) -> i32 {
    let (rows, cols) = dem.shape();
    // Callers pass only in-bounds cells.
    let center = unsafe { dem.get_unchecked(row, col) };

    let mut lowest: Option<(Direction, i32)> = None;
    for (dir, nr, nc) in Neighbors::new(row, col, rows, cols) {
        if !dem.is_valid(nr, nc) {
            continue;
        }
        let z = unsafe { dem.get_unchecked(nr, nc) };
        if lowest.map_or(true, |(_, low)| z < low) {
            lowest = Some((dir, z));
        }
    }

    match lowest {
        Some((dir, z)) if z < center => dir.code(),
        _ => NO_FLOW,
    }
}

/// Give an outflow to the flats that depression filling created.
///
/// A flat here is a connected set of valid, equal-elevation cells of
/// `filled` with no direction. Only flats that contain at least one cell
/// raised by the filler (`filled > original`) are touched, so flats already
/// present in the original DEM keep `NO_FLOW`.
///
/// Cells are routed by breadth-first distance over the flat from its
/// drainage cells: equal-elevation cells that already have a direction, lie
/// on the raster edge, or touch NODATA. Each resolved cell points at the
/// first neighbour in scan order that is one step closer. Edge and NODATA
/// adjacent cells keep `NO_FLOW` since their water leaves the grid.
///
/// Returns the number of cells that received a direction.
pub fn resolve_filled_flats(
    dirs: &mut Raster<i32>,
    filled: &Raster<i32>,
    original: &Raster<i32>,
) -> Result<usize> {
    filled.check_shape("original", original)?;
    filled.check_shape("directions", dirs)?;

    let (rows, cols) = filled.shape();
    let z = filled.data();
    let z0 = original.data();

    // Step 1: Mark every no-flow cell of a flat that holds a raised cell
    let mut eligible = Array2::<bool>::from_elem((rows, cols), false);
    let mut stack = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let raised = filled.is_valid(row, col)
                && original.is_valid(row, col)
                && z[(row, col)] > z0[(row, col)];
            if !raised || eligible[(row, col)] || dirs.data()[(row, col)] != NO_FLOW {
                continue;
            }

            eligible[(row, col)] = true;
            stack.push((row, col));
            while let Some((r, c)) = stack.pop() {
                for (_, nr, nc) in Neighbors::new(r, c, rows, cols) {
                    if !eligible[(nr, nc)]
                        && filled.is_valid(nr, nc)
                        && z[(nr, nc)] == z[(r, c)]
                        && dirs.data()[(nr, nc)] == NO_FLOW
                    {
                        eligible[(nr, nc)] = true;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }

    // Step 2: Breadth-first distance from drainage cells
    let mut dist = Array2::<u32>::from_elem((rows, cols), u32::MAX);
    let mut queue = VecDeque::new();
    for row in 0..rows {
        for col in 0..cols {
            if is_drainage(dirs, filled, row, col) {
                dist[(row, col)] = 0;
                queue.push_back((row, col));
            }
        }
    }

    while let Some((r, c)) = queue.pop_front() {
        let next = dist[(r, c)] + 1;
        for (_, nr, nc) in Neighbors::new(r, c, rows, cols) {
            if eligible[(nr, nc)] && dist[(nr, nc)] == u32::MAX && z[(nr, nc)] == z[(r, c)] {
                dist[(nr, nc)] = next;
                queue.push_back((nr, nc));
            }
        }
    }

    // Step 3: Point each reached cell one step down the distance field
    let mut resolved = 0;
    let mut unreached = 0;
    for row in 0..rows {
        for col in 0..cols {
            if !eligible[(row, col)] {
                continue;
            }
            let d = dist[(row, col)];
            if d == u32::MAX {
                unreached += 1;
                continue;
            }
            if d == 0 {
                continue;
            }

            let target = Neighbors::new(row, col, rows, cols)
                .find(|&(_, nr, nc)| dist[(nr, nc)] == d - 1 && z[(nr, nc)] == z[(row, col)]);
            if let Some((dir, _, _)) = target {
                dirs.data_mut()[(row, col)] = dir.code();
                resolved += 1;
            }
        }
    }

    debug!(resolved, unreached, "filled flats resolved");
    Ok(resolved)
}

/// A valid cell whose water already leaves it: it has a direction, sits on
/// the raster edge, or touches NODATA.
fn is_drainage(dirs: &Raster<i32>, filled: &Raster<i32>, row: usize, col: usize) -> bool {
    if !filled.is_valid(row, col) {
        return false;
    }
    let (rows, cols) = filled.shape();
    if dirs.data()[(row, col)] != NO_FLOW {
        return true;
    }
    if row == 0 || col == 0 || row + 1 == rows || col + 1 == cols {
        return true;
    }
    Neighbors::new(row, col, rows, cols).any(|(_, nr, nc)| !filled.is_valid(nr, nc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::{fill_depressions, FillParams};
    use hydroflow_core::GeoTransform;

    fn grid(rows: usize, cols: usize, f: impl Fn(usize, usize) -> i32) -> Raster<i32> {
        let data = (0..rows * cols).map(|i| f(i / cols, i % cols)).collect();
        let mut dem = Raster::from_vec(data, rows, cols).unwrap();
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        dem.set_nodata(Some(-9999));
        dem
    }

    #[test]
    fn test_flow_direction_slope_east() {
        let dem = grid(5, 5, |_, c| (5 - c as i32) * 10);
        let fdir = flow_direction_d8(&dem).unwrap();
        assert_eq!(fdir.get(2, 2).unwrap(), Direction::East.code());
    }

    #[test]
    fn test_plane_ties_resolve_in_scan_order() {
        // Rising to the south: NW, N and NE are equally low, NW is scanned first.
        let dem = grid(5, 5, |r, _| r as i32 * 10);
        let fdir = flow_direction_d8(&dem).unwrap();
        assert_eq!(fdir.get(2, 2).unwrap(), Direction::NorthWest.code());
    }

    #[test]
    fn test_flow_direction_diagonal() {
        let dem = grid(5, 5, |r, c| (10 - r as i32 - c as i32) * 10);
        let fdir = flow_direction_d8(&dem).unwrap();
        assert_eq!(fdir.get(2, 2).unwrap(), Direction::SouthEast.code());
    }

    #[test]
    fn test_lowest_not_steepest() {
        // North drops more per unit distance, south-east is lower.
        #[rustfmt::skip]
        let dem = Raster::from_vec(vec![
            20, 10, 20,
            20, 20, 20,
            20, 20,  9,
        ], 3, 3).unwrap();
        let fdir = flow_direction_d8(&dem).unwrap();
        assert_eq!(fdir.get(1, 1).unwrap(), Direction::SouthEast.code());
    }

    #[test]
    fn test_ties_take_first_in_scan_order() {
        // E and W are both lowest; E comes first.
        let dem = Raster::from_vec(vec![9, 9, 9, 1, 5, 1, 9, 9, 9], 3, 3).unwrap();
        let fdir = flow_direction_d8(&dem).unwrap();
        assert_eq!(fdir.get(1, 1).unwrap(), Direction::East.code());
    }

    #[test]
    fn test_pit_and_flat_have_no_flow() {
        let mut dem = grid(5, 5, |_, _| 10);
        dem.set(2, 2, 1).unwrap();
        let fdir = flow_direction_d8(&dem).unwrap();

        assert_eq!(fdir.get(2, 2).unwrap(), NO_FLOW);
        // Cells around the pit drain into it; far cells are flat.
        assert_eq!(fdir.get(1, 1).unwrap(), Direction::SouthEast.code());
        assert_eq!(fdir.get(0, 0).unwrap(), NO_FLOW);
    }

    #[test]
    fn test_nodata_is_carried_and_never_a_target() {
        let mut dem = grid(3, 3, |_, c| 10 - c as i32);
        dem.set(1, 2, -9999).unwrap();
        let fdir = flow_direction_d8(&dem).unwrap();

        assert_eq!(fdir.nodata(), Some(-9999));
        assert_eq!(fdir.get(1, 2).unwrap(), -9999);
        assert_ne!(fdir.get(1, 1).unwrap(), Direction::East.code());
    }

    #[test]
    fn test_rejects_nodata_inside_code_range() {
        let mut dem = grid(3, 3, |_, _| 1);
        dem.set_nodata(Some(64));
        let err = flow_direction_d8(&dem).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "nodata", .. }));
    }

    #[test]
    fn test_resolve_single_cell_pit() {
        #[rustfmt::skip]
        let dem = Raster::from_vec(vec![
            5, 6, 7,
            4, 1, 8,
            9, 6, 5,
        ], 3, 3).unwrap();
        let filled = fill_depressions(&dem, FillParams::default()).unwrap();
        let mut dirs = flow_direction_d8(&filled).unwrap();
        assert_eq!(dirs.get(1, 1).unwrap(), NO_FLOW);

        let resolved = resolve_filled_flats(&mut dirs, &filled, &dem).unwrap();

        assert_eq!(resolved, 1);
        assert_eq!(dirs.get(1, 1).unwrap(), Direction::West.code());
    }

    #[test]
    fn test_resolve_routes_across_filled_flat() {
        // A two-cell pond that spills through the east wall at 5.
        #[rustfmt::skip]
        let dem = Raster::from_vec(vec![
            9, 9, 9, 9, 9,
            9, 1, 2, 5, 4,
            9, 9, 9, 9, 9,
        ], 3, 5).unwrap();
        let filled = fill_depressions(&dem, FillParams::default()).unwrap();
        assert_eq!(filled.get(1, 1).unwrap(), 5);
        assert_eq!(filled.get(1, 2).unwrap(), 5);

        let mut dirs = flow_direction_d8(&filled).unwrap();
        assert_eq!(dirs.get(1, 3).unwrap(), Direction::East.code());

        let resolved = resolve_filled_flats(&mut dirs, &filled, &dem).unwrap();

        assert_eq!(resolved, 2);
        assert_eq!(dirs.get(1, 2).unwrap(), Direction::East.code());
        assert_eq!(dirs.get(1, 1).unwrap(), Direction::East.code());
    }

    #[test]
    fn test_resolve_leaves_natural_flats_alone() {
        let dem = grid(4, 4, |_, _| 7);
        let mut dirs = flow_direction_d8(&dem).unwrap();
        let resolved = resolve_filled_flats(&mut dirs, &dem, &dem).unwrap();

        assert_eq!(resolved, 0);
        assert!(dirs.data().iter().all(|&d| d == NO_FLOW));
    }

    #[test]
    fn test_resolve_rejects_mismatched_original() {
        let dem = grid(3, 3, |_, _| 1);
        let other = grid(2, 3, |_, _| 1);
        let mut dirs = flow_direction_d8(&dem).unwrap();

        let err = resolve_filled_flats(&mut dirs, &dem, &other).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { name: "original", .. }));
    }
}
