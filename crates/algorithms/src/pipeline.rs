//! End-to-end hydrological conditioning
//!
//! Fill → (slope → steepness) → route → accumulate, driven by a
//! [`PipelineConfig`] that can be loaded from JSON.

use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::hydrology::{
    fill_depressions, Accumulation, FillParams, Propagation, RoutingStrategy, DEFAULT_LEAF_CELLS,
};
use crate::terrain::{classify_steepness, slope, SlopeParams, SteepnessParams};
use hydroflow_core::raster::{Raster, RasterStatistics};
use hydroflow_core::{Error, Result};

/// Routing model selected in a [`PipelineConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// D8 everywhere
    Steepest,
    /// D8 on steep cells, MFD on gentle cells
    #[default]
    Hybrid,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "steepest" | "d8" => Ok(Strategy::Steepest),
            "hybrid" | "mfd" => Ok(Strategy::Hybrid),
            _ => Err(Error::InvalidParameter {
                name: "strategy",
                value: s.to_string(),
                reason: "use steepest or hybrid".into(),
            }),
        }
    }
}

/// Settings for a [`HydrologyPipeline`] run.
///
/// Missing fields take their defaults when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub strategy: Strategy,
    /// Slopes above this angle (degrees) route as D8 under the hybrid strategy
    pub steep_threshold_degrees: f64,
    /// Largest partition filled directly
    pub leaf_cells: usize,
    pub propagation: Propagation,
    /// Overrides the DEM's cell size for slope
    pub cell_size: Option<f64>,
    /// Route flats created by filling (steepest strategy only)
    pub resolve_flats: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            steep_threshold_degrees: SteepnessParams::default().threshold_degrees,
            leaf_cells: DEFAULT_LEAF_CELLS,
            propagation: Propagation::default(),
            cell_size: None,
            resolve_flats: true,
        }
    }
}

/// Everything a pipeline run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub original_stats: RasterStatistics<i32>,
    pub filled_stats: RasterStatistics<i32>,
    /// Number of cells the filler raised
    pub raised_cells: usize,
    pub filled: Raster<i32>,
    /// Present under the hybrid strategy
    pub slope: Option<Raster<f64>>,
    /// Present under the hybrid strategy
    pub steepness: Option<Raster<u8>>,
    pub directions: Raster<i32>,
    pub accumulation: Accumulation,
}

/// Runs the conditioning chain over a DEM
#[derive(Debug, Clone, Default)]
pub struct HydrologyPipeline {
    config: PipelineConfig,
}

impl HydrologyPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fill, route and accumulate `dem`. The DEM is not modified.
    pub fn run(&self, dem: &Raster<i32>) -> Result<PipelineOutput> {
        let config = &self.config;
        let (rows, cols) = dem.shape();
        info!(rows, cols, strategy = ?config.strategy, "starting pipeline");

        let original_stats = dem.statistics();

        let filled = stage("fill", || {
            fill_depressions(dem, FillParams { leaf_cells: config.leaf_cells })
        })?;
        let raised_cells = filled
            .data()
            .iter()
            .zip(dem.data().iter())
            .filter(|(f, o)| f != o)
            .count();
        let filled_stats = filled.statistics();

        let (slope_raster, steepness) = match config.strategy {
            Strategy::Hybrid => {
                let s = stage("slope", || slope(&filled, SlopeParams { cell_size: config.cell_size }))?;
                let params = SteepnessParams {
                    threshold_degrees: config.steep_threshold_degrees,
                };
                let st = stage("steepness", || classify_steepness(&s, params))?;
                (Some(s), Some(st))
            }
            Strategy::Steepest => (None, None),
        };

        let routing = match (&slope_raster, &steepness) {
            (Some(slope), Some(steep)) => RoutingStrategy::Hybrid { slope, steep },
            _ => RoutingStrategy::Steepest {
                original: config.resolve_flats.then_some(dem),
            },
        };

        let directions = stage("direction", || routing.route(&filled))?;
        let accumulation = stage("accumulation", || {
            routing.accumulate(&directions, &filled, config.propagation)
        })?;

        Ok(PipelineOutput {
            original_stats,
            filled_stats,
            raised_cells,
            filled,
            slope: slope_raster,
            steepness,
            directions,
            accumulation,
        })
    }
}

/// Run one stage and log how long it took
fn stage<T>(name: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let out = f()?;
    info!(stage = name, elapsed = ?start.elapsed(), "stage complete");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydroflow_core::raster::{Direction, NO_FLOW};

    fn dem(rows: usize, cols: usize, values: &[i32]) -> Raster<i32> {
        let mut r = Raster::from_vec(values.to_vec(), rows, cols).unwrap();
        r.set_nodata(Some(-9999));
        r
    }

    #[test]
    fn test_default_config() {
        let c = PipelineConfig::default();
        assert_eq!(c.strategy, Strategy::Hybrid);
        assert_eq!(c.steep_threshold_degrees, 20.0);
        assert_eq!(c.leaf_cells, 1000);
        assert_eq!(c.propagation, Propagation::Sweep);
        assert!(c.resolve_flats);
    }

    #[test]
    fn test_config_from_partial_json() {
        let c: PipelineConfig =
            serde_json::from_str(r#"{ "strategy": "steepest", "propagation": "topological" }"#).unwrap();
        assert_eq!(c.strategy, Strategy::Steepest);
        assert_eq!(c.propagation, Propagation::Topological);
        assert_eq!(c.leaf_cells, 1000);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("D8".parse::<Strategy>().unwrap(), Strategy::Steepest);
        assert_eq!("topo".parse::<Propagation>().unwrap(), Propagation::Topological);
        assert!("nope".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_steepest_pipeline_on_pit() {
        #[rustfmt::skip]
        let dem = dem(3, 3, &[
            5, 6, 7,
            4, 1, 8,
            9, 6, 5,
        ]);
        let config = PipelineConfig {
            strategy: Strategy::Steepest,
            propagation: Propagation::Topological,
            ..Default::default()
        };
        let out = HydrologyPipeline::new(config).run(&dem).unwrap();

        assert_eq!(out.raised_cells, 1);
        assert_eq!(out.original_stats.min, Some(1));
        assert_eq!(out.filled_stats.min, Some(4));
        assert!(out.slope.is_none());
        assert_eq!(out.directions.get(1, 1).unwrap(), Direction::West.code());
        assert_eq!(out.accumulation.value(1, 0), Some(9.0));
    }

    #[test]
    fn test_hybrid_pipeline_on_flat() {
        let dem = dem(4, 4, &[3; 16]);
        let out = HydrologyPipeline::default().run(&dem).unwrap();

        assert_eq!(out.raised_cells, 0);
        assert!(out.directions.data().iter().all(|&d| d == NO_FLOW));
        assert!(matches!(out.accumulation, Accumulation::Weighted(_)));
        for r in 0..4 {
            for c in 0..4 {
                assert_eq!(out.accumulation.value(r, c), Some(1.0));
            }
        }
    }
}
