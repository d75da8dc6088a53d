//! # hydroflow Core
//!
//! Core types, traits and text I/O for the hydroflow hydrology toolkit.
//!
//! This crate provides:
//! - `Raster<T>`: Generic raster grid type
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `Direction`: The D8 neighbourhood with its flow-direction codes
//! - Algorithm traits for consistent API
//! - I/O for ESRI ASCII grids and comma-separated output

pub mod error;
pub mod io;
pub mod raster;

pub use error::{Error, Result};
pub use raster::{Direction, GeoTransform, Raster, RasterElement, RasterStatistics};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{Direction, GeoTransform, Raster, RasterElement, NO_FLOW};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in hydroflow.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
