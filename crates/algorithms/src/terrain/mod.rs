//! Terrain analysis algorithms
//!
//! Surface derivatives used to choose between single and multiple flow routing:
//! - Slope: centered-difference gradient in degrees
//! - Steepness: binary steep/gentle mask from a slope threshold

mod slope;
mod steepness;

pub use slope::{slope, Slope, SlopeParams};
pub use steepness::{classify_steepness, SteepnessParams, GENTLE, STEEP, STEEPNESS_NODATA};
