//! Flow routing strategies
//!
//! Single steepest-descent routing and hybrid D8/MFD routing share the same
//! neighbour scan and differ only in which neighbours they pick and how they
//! weigh them. [`RoutingStrategy`] chooses between them and carries the extra
//! rasters each one needs.

use std::path::Path;

use hydroflow_core::io::{write_csv, CsvOptions};
use hydroflow_core::raster::Raster;
use hydroflow_core::Result;

use super::flow_accumulation::{flow_accumulation_d8, Propagation};
use super::flow_accumulation_hybrid::flow_accumulation_hybrid;
use super::flow_direction::{flow_direction_d8, resolve_filled_flats};
use super::flow_direction_hybrid::flow_direction_hybrid;

/// How flow leaves each cell of a filled DEM
#[derive(Debug, Clone, Copy)]
pub enum RoutingStrategy<'a> {
    /// D8 to the lowest neighbour. With the pre-fill DEM, flats created by
    /// filling are routed to their outlet.
    Steepest { original: Option<&'a Raster<i32>> },
    /// D8 on steep cells, thresholded MFD on gentle ones
    Hybrid {
        slope: &'a Raster<f64>,
        steep: &'a Raster<u8>,
    },
}

impl RoutingStrategy<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            RoutingStrategy::Steepest { .. } => "steepest",
            RoutingStrategy::Hybrid { .. } => "hybrid",
        }
    }

    /// Flow direction raster for `filled`
    pub fn route(&self, filled: &Raster<i32>) -> Result<Raster<i32>> {
        match *self {
            RoutingStrategy::Steepest { original } => {
                let mut dirs = flow_direction_d8(filled)?;
                if let Some(original) = original {
                    resolve_filled_flats(&mut dirs, filled, original)?;
                }
                Ok(dirs)
            }
            RoutingStrategy::Hybrid { slope, steep } => flow_direction_hybrid(slope, filled, steep),
        }
    }

    /// Accumulate `dirs`, which must come from [`route`](Self::route) on the same strategy
    pub fn accumulate(
        &self,
        dirs: &Raster<i32>,
        filled: &Raster<i32>,
        propagation: Propagation,
    ) -> Result<Accumulation> {
        match *self {
            RoutingStrategy::Steepest { .. } => {
                filled.check_shape("directions", dirs)?;
                flow_accumulation_d8(dirs, propagation).map(Accumulation::Count)
            }
            RoutingStrategy::Hybrid { slope, steep } => {
                flow_accumulation_hybrid(dirs, slope, filled, steep, propagation).map(Accumulation::Weighted)
            }
        }
    }
}

/// Flow accumulation in the representation of its routing strategy
#[derive(Debug, Clone)]
pub enum Accumulation {
    /// Whole upstream cell counts (D8)
    Count(Raster<i64>),
    /// Fractional upstream area (hybrid)
    Weighted(Raster<f64>),
}

impl Accumulation {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Accumulation::Count(r) => r.shape(),
            Accumulation::Weighted(r) => r.shape(),
        }
    }

    /// Value at (row, col) as `f64`, `None` when out of bounds or NODATA
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        match self {
            Accumulation::Count(r) => r
                .is_valid(row, col)
                .then(|| r.data()[(row, col)] as f64),
            Accumulation::Weighted(r) => r
                .is_valid(row, col)
                .then(|| r.data()[(row, col)]),
        }
    }

    /// Largest accumulated value over valid cells
    pub fn max(&self) -> Option<f64> {
        match self {
            Accumulation::Count(r) => r.statistics().max.map(|v| v as f64),
            Accumulation::Weighted(r) => r.statistics().max,
        }
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P, options: &CsvOptions) -> Result<()> {
        match self {
            Accumulation::Count(r) => write_csv(r, path, options),
            Accumulation::Weighted(r) => write_csv(r, path, options),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::{fill_depressions, FillParams};
    use crate::terrain::{classify_steepness, slope, SlopeParams, SteepnessParams};
    use hydroflow_core::raster::{Direction, NO_FLOW};

    fn pit() -> Raster<i32> {
        #[rustfmt::skip]
        let mut dem = Raster::from_vec(vec![
            5, 6, 7,
            4, 1, 8,
            9, 6, 5,
        ], 3, 3).unwrap();
        dem.set_nodata(Some(-9999));
        dem
    }

    #[test]
    fn test_steepest_resolves_only_with_original() {
        let dem = pit();
        let filled = fill_depressions(&dem, FillParams::default()).unwrap();

        let plain = RoutingStrategy::Steepest { original: None }.route(&filled).unwrap();
        assert_eq!(plain.get(1, 1).unwrap(), NO_FLOW);

        let resolved = RoutingStrategy::Steepest { original: Some(&dem) }.route(&filled).unwrap();
        assert_eq!(resolved.get(1, 1).unwrap(), Direction::West.code());
    }

    #[test]
    fn test_accumulation_variant_follows_strategy() {
        let dem = pit();
        let filled = fill_depressions(&dem, FillParams::default()).unwrap();

        let steepest = RoutingStrategy::Steepest { original: Some(&dem) };
        let dirs = steepest.route(&filled).unwrap();
        let acc = steepest.accumulate(&dirs, &filled, Propagation::Topological).unwrap();
        assert!(matches!(acc, Accumulation::Count(_)));
        // Five cells drain into the filled pit, which spills west.
        assert_eq!(acc.value(1, 1), Some(6.0));
        assert_eq!(acc.value(1, 0), Some(9.0));

        let s = slope(&filled, SlopeParams::default()).unwrap();
        let steep = classify_steepness(&s, SteepnessParams::default()).unwrap();
        let hybrid = RoutingStrategy::Hybrid { slope: &s, steep: &steep };
        let dirs = hybrid.route(&filled).unwrap();
        let acc = hybrid.accumulate(&dirs, &filled, Propagation::Topological).unwrap();
        assert!(matches!(acc, Accumulation::Weighted(_)));
        assert_eq!(acc.shape(), (3, 3));
        assert!(acc.max().unwrap() >= 1.0);
        assert_eq!(hybrid.name(), "hybrid");
    }
}
