//! D8 flow accumulation
//!
//! Counts the cells draining through each cell, the cell itself included,
//! so every valid cell is at least 1.
//!
//! Two propagation orders are available:
//! - [`Propagation::Sweep`] adds each cell into its target during a forward
//!   raster-order pass and again during a backward pass. A cell may
//!   contribute before its own upstream total is complete, and a cell's value
//!   can reach its target in both passes, so totals are not conserved.
//! - [`Propagation::Topological`] visits headwaters first using in-degree
//!   counts, so each cell contributes exactly once with its final total.

use std::str::FromStr;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hydroflow_core::raster::{Direction, Raster, RasterElement, NO_FLOW};
use hydroflow_core::{Algorithm, Error, Result};

/// Order in which accumulation is propagated downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Propagation {
    /// Raster-order passes without waiting for upstream totals
    #[default]
    Sweep,
    /// Upstream cells are always complete before they contribute
    Topological,
}

impl FromStr for Propagation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sweep" => Ok(Propagation::Sweep),
            "topological" | "topo" => Ok(Propagation::Topological),
            _ => Err(Error::InvalidParameter {
                name: "propagation",
                value: s.to_string(),
                reason: "use sweep or topological".into(),
            }),
        }
    }
}

/// Flow accumulation algorithm (D8)
#[derive(Debug, Clone, Default)]
pub struct FlowAccumulation;

impl Algorithm for FlowAccumulation {
    type Input = Raster<i32>;
    type Output = Raster<i64>;
    type Params = Propagation;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Accumulation (D8)"
    }

    fn description(&self) -> &'static str {
        "Count upstream cells from a D8 flow direction raster"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        flow_accumulation_d8(&input, params)
    }
}

/// Calculate flow accumulation from a D8 flow direction raster.
///
/// Valid cells start at 1. NODATA cells of `dirs` stay NODATA in the output
/// and never receive flow.
///
/// # Errors
/// `Error::InvalidParameter` when a valid cell holds something other than
/// `NO_FLOW` or a single direction code.
pub fn flow_accumulation_d8(dirs: &Raster<i32>, propagation: Propagation) -> Result<Raster<i64>> {
    let (rows, cols) = dirs.shape();
    let targets = d8_targets(dirs)?;

    let nodata = dirs.nodata().map(i64::from);
    let mut acc = Array2::<i64>::from_elem((rows, cols), 1);
    for ((row, col), v) in acc.indexed_iter_mut() {
        if !dirs.is_valid(row, col) {
            *v = nodata.unwrap_or_else(i64::default_nodata);
        }
    }

    match propagation {
        Propagation::Sweep => sweep(&mut acc, &targets),
        Propagation::Topological => topological(&mut acc, &targets),
    }

    debug!(rows, cols, ?propagation, "D8 accumulation complete");

    let mut output = dirs.with_same_meta::<i64>();
    output.set_nodata(nodata);
    *output.data_mut() = acc;
    Ok(output)
}

/// Downstream cell of every valid cell, if it has one
fn d8_targets(dirs: &Raster<i32>) -> Result<Array2<Option<(usize, usize)>>> {
    let (rows, cols) = dirs.shape();
    let mut targets = Array2::from_elem((rows, cols), None);

    for ((row, col), &code) in dirs.data().indexed_iter() {
        if !dirs.is_valid(row, col) || code == NO_FLOW {
            continue;
        }
        let dir = Direction::from_code(code).ok_or_else(|| Error::InvalidParameter {
            name: "directions",
            value: code.to_string(),
            reason: format!("cell ({}, {}) does not hold a single D8 code", row, col),
        })?;

        targets[(row, col)] = dir
            .step(row, col, rows, cols)
            .filter(|&(nr, nc)| dirs.is_valid(nr, nc));
    }

    Ok(targets)
}

fn sweep(acc: &mut Array2<i64>, targets: &Array2<Option<(usize, usize)>>) {
    let (rows, cols) = acc.dim();
    let cells = || (0..rows).flat_map(move |r| (0..cols).map(move |c| (r, c)));

    for (row, col) in cells() {
        if let Some(t) = targets[(row, col)] {
            acc[t] += acc[(row, col)];
        }
    }
    let backward: Vec<_> = cells().collect();
    for &(row, col) in backward.iter().rev() {
        if let Some(t) = targets[(row, col)] {
            acc[t] += acc[(row, col)];
        }
    }
}

fn topological(acc: &mut Array2<i64>, targets: &Array2<Option<(usize, usize)>>) {
    // Step 1: Build in-degree count (how many cells flow INTO each cell)
    let mut in_degree = Array2::<u32>::zeros(acc.dim());
    for t in targets.iter().flatten() {
        in_degree[*t] += 1;
    }

    // Step 2: Initialize stack with headwater cells (in-degree = 0)
    let mut stack: Vec<(usize, usize)> = in_degree
        .indexed_iter()
        .filter(|&(_, &n)| n == 0)
        .map(|(idx, _)| idx)
        .collect();

    // Step 3: Each cell passes its finished total downstream
    while let Some(cell) = stack.pop() {
        let Some(t) = targets[cell] else {
            continue;
        };
        acc[t] += acc[cell];
        in_degree[t] -= 1;
        if in_degree[t] == 0 {
            stack.push(t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::flow_direction::flow_direction_d8;

    fn dirs(rows: usize, cols: usize, codes: &[i32]) -> Raster<i32> {
        let mut r = Raster::from_vec(codes.to_vec(), rows, cols).unwrap();
        r.set_nodata(Some(-9999));
        r
    }

    const E: i32 = 1;
    const W: i32 = 16;

    #[test]
    fn test_topological_linear_chain() {
        let d = dirs(1, 5, &[E, E, E, E, 0]);
        let acc = flow_accumulation_d8(&d, Propagation::Topological).unwrap();
        assert_eq!(acc.data().as_slice().unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_sweep_linear_chain_east() {
        // Forward pass leaves 1 2 3 4 5; the backward pass adds each cell's
        // current value into its target once more.
        let d = dirs(1, 5, &[E, E, E, E, 0]);
        let acc = flow_accumulation_d8(&d, Propagation::Sweep).unwrap();
        assert_eq!(acc.data().as_slice().unwrap(), &[1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_sweep_linear_chain_west() {
        let d = dirs(1, 5, &[0, W, W, W, W]);
        let acc = flow_accumulation_d8(&d, Propagation::Sweep).unwrap();
        assert_eq!(acc.data().as_slice().unwrap(), &[9, 7, 5, 3, 1]);
    }

    #[test]
    fn test_convergent_center() {
        let mut dem = Raster::filled(3, 3, 5);
        dem.set(1, 1, 1).unwrap();
        dem.set_nodata(Some(-9999));
        let fdir = flow_direction_d8(&dem).unwrap();

        let acc = flow_accumulation_d8(&fdir, Propagation::Topological).unwrap();
        assert_eq!(acc.get(1, 1).unwrap(), 9);
        assert_eq!(acc.get(0, 0).unwrap(), 1);

        // Every neighbour feeds the centre directly, so both orders agree.
        let swept = flow_accumulation_d8(&fdir, Propagation::Sweep).unwrap();
        assert_eq!(swept.get(1, 1).unwrap(), 17);
    }

    #[test]
    fn test_all_no_flow_is_all_ones() {
        let d = dirs(4, 4, &[NO_FLOW; 16]);
        for p in [Propagation::Sweep, Propagation::Topological] {
            let acc = flow_accumulation_d8(&d, p).unwrap();
            assert!(acc.data().iter().all(|&v| v == 1));
        }
    }

    #[test]
    fn test_nodata_never_receives() {
        let d = dirs(1, 3, &[E, E, -9999]);
        let acc = flow_accumulation_d8(&d, Propagation::Topological).unwrap();
        assert_eq!(acc.data().as_slice().unwrap(), &[1, 2, -9999]);
        assert_eq!(acc.nodata(), Some(-9999));
    }

    #[test]
    fn test_flow_off_grid_is_dropped() {
        let d = dirs(1, 2, &[W, E]);
        let acc = flow_accumulation_d8(&d, Propagation::Topological).unwrap();
        assert_eq!(acc.data().as_slice().unwrap(), &[1, 1]);
    }

    #[test]
    fn test_rejects_mfd_mask() {
        let d = dirs(1, 2, &[E | 2, 0]);
        let err = flow_accumulation_d8(&d, Propagation::Sweep).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "directions", .. }));
    }

    #[test]
    fn test_propagation_serde_names() {
        assert_eq!(serde_json::to_string(&Propagation::Topological).unwrap(), "\"topological\"");
        let p: Propagation = serde_json::from_str("\"sweep\"").unwrap();
        assert_eq!(p, Propagation::Sweep);
    }
}
