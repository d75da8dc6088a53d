//! Hybrid D8/MFD flow accumulation
//!
//! Steep cells pass their whole value to their D8 target. Gentle cells pass
//! `value * share_i` to every direction set in their mask, with the shares
//! from [`transfer_shares`]. Only bits holding at least half of the weight
//! are set, so part of a gentle cell's value can leave the system.
//!
//! With [`Propagation::Sweep`] every row is processed in parallel and each
//! cell forwards whatever it holds at that moment; concurrent additions go
//! through an atomic compare-and-swap on the `f64` bits, and the result
//! depends on scheduling. With [`Propagation::Topological`] cells are visited
//! from the highest filled elevation down, which finalizes every cell before
//! it contributes because all hybrid edges point strictly downhill.

use std::sync::atomic::{AtomicU64, Ordering};

use ndarray::Array2;
use tracing::debug;

use super::flow_accumulation::Propagation;
use super::flow_direction_hybrid::{cell_class, transfer_shares, CellClass};
use crate::maybe_rayon::*;
use hydroflow_core::raster::{directions_in_mask, Direction, Raster, NO_FLOW};
use hydroflow_core::{Error, Result};

/// Downstream cell and the fraction of the value it receives
type Outflow = ((usize, usize), f64);

/// Calculate hybrid flow accumulation.
///
/// `dirs` must come from
/// [`flow_direction_hybrid`](super::flow_direction_hybrid::flow_direction_hybrid)
/// over the same `slope`, `filled` and `steep` rasters. Valid cells start at
/// 1.0; NODATA cells are NaN.
///
/// # Errors
/// - `Error::SizeMismatch` when an input's shape differs from `filled`
/// - `Error::InvalidParameter` when a steep cell holds more than one direction
pub fn flow_accumulation_hybrid(
    dirs: &Raster<i32>,
    slope: &Raster<f64>,
    filled: &Raster<i32>,
    steep: &Raster<u8>,
    propagation: Propagation,
) -> Result<Raster<f64>> {
    filled.check_shape("directions", dirs)?;
    filled.check_shape("slope", slope)?;
    filled.check_shape("steepness", steep)?;

    let (rows, cols) = filled.shape();
    let valid = |row: usize, col: usize| {
        dirs.is_valid(row, col) && cell_class(slope, filled, steep, row, col) != CellClass::NoData
    };

    // Outflows are computed once so both propagation orders share them.
    let mut outflows: Array2<Vec<Outflow>> = Array2::from_elem((rows, cols), Vec::new());
    for ((row, col), out) in outflows.indexed_iter_mut() {
        if valid(row, col) {
            *out = cell_outflows(dirs, slope, filled, steep, row, col)?
                .into_iter()
                .filter(|&((nr, nc), _)| valid(nr, nc))
                .collect();
        }
    }

    let initial = |row: usize, col: usize| if valid(row, col) { 1.0 } else { f64::NAN };

    let acc = match propagation {
        Propagation::Sweep => sweep(&outflows, initial),
        Propagation::Topological => topological(&outflows, filled, initial),
    };

    debug!(rows, cols, ?propagation, "hybrid accumulation complete");

    let mut output = filled.with_same_meta::<f64>();
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = acc;
    Ok(output)
}

fn cell_outflows(
    dirs: &Raster<i32>,
    slope: &Raster<f64>,
    filled: &Raster<i32>,
    steep: &Raster<u8>,
    row: usize,
    col: usize,
) -> Result<Vec<Outflow>> {
    let (rows, cols) = filled.shape();
    let code = dirs.data()[(row, col)];
    if code == NO_FLOW {
        return Ok(Vec::new());
    }

    let step = |dir: Direction| dir.step(row, col, rows, cols);

    match cell_class(slope, filled, steep, row, col) {
        CellClass::Steep => {
            let dir = Direction::from_code(code).ok_or_else(|| Error::InvalidParameter {
                name: "directions",
                value: code.to_string(),
                reason: format!("steep cell ({}, {}) must hold a single D8 code", row, col),
            })?;
            Ok(step(dir).map(|t| (t, 1.0)).into_iter().collect())
        }
        CellClass::Gentle => {
            let shares = transfer_shares(slope, filled, row, col);
            Ok(directions_in_mask(code)
                .filter_map(|dir| step(dir).map(|t| (t, shares[dir.index()])))
                .filter(|&(_, share)| share > 0.0)
                .collect())
        }
        CellClass::NoData => Ok(Vec::new()),
    }
}

fn sweep(outflows: &Array2<Vec<Outflow>>, initial: impl Fn(usize, usize) -> f64) -> Array2<f64> {
    let (rows, cols) = outflows.dim();
    let cells: Array2<AtomicU64> =
        Array2::from_shape_fn((rows, cols), |(r, c)| AtomicU64::new(initial(r, c).to_bits()));

    (0..rows).into_par_iter().for_each(|row| {
        for col in 0..cols {
            let targets = &outflows[(row, col)];
            if targets.is_empty() {
                continue;
            }
            let value = f64::from_bits(cells[(row, col)].load(Ordering::Acquire));
            for &(t, share) in targets {
                atomic_add(&cells[t], value * share);
            }
        }
    });

    Array2::from_shape_fn((rows, cols), |idx| f64::from_bits(cells[idx].load(Ordering::Acquire)))
}

fn atomic_add(cell: &AtomicU64, delta: f64) {
    // The closure never returns None, so the update always succeeds.
    let _ = cell.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
        Some((f64::from_bits(bits) + delta).to_bits())
    });
}

fn topological(
    outflows: &Array2<Vec<Outflow>>,
    filled: &Raster<i32>,
    initial: impl Fn(usize, usize) -> f64,
) -> Array2<f64> {
    let (rows, cols) = outflows.dim();
    let mut acc = Array2::from_shape_fn((rows, cols), |(r, c)| initial(r, c));

    // Step 1: Build sorted cells (highest first); row-major order breaks ties
    let z = filled.data();
    let mut order: Vec<(usize, usize)> = outflows
        .indexed_iter()
        .filter(|(_, out)| !out.is_empty())
        .map(|(idx, _)| idx)
        .collect();
    order.sort_by(|a, b| z[*b].cmp(&z[*a]));

    // Step 2: Push each finished value downstream
    for cell in order {
        let value = acc[cell];
        for &(t, share) in &outflows[cell] {
            acc[t] += value * share;
        }
    }
    acc
}
