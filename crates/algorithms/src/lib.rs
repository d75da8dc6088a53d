//! # hydroflow Algorithms
//!
//! Hydrological conditioning of integer DEMs.
//!
//! ## Available Algorithm Categories
//!
//! - **terrain**: Slope and steep/gentle classification
//! - **hydrology**: Depression filling, D8 and hybrid D8/MFD flow direction, flow accumulation
//! - **pipeline**: The full fill → route → accumulate chain driven by a serializable config

pub mod hydrology;
pub(crate) mod maybe_rayon;
pub mod pipeline;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        fill_depressions, flow_accumulation_d8, flow_accumulation_hybrid,
        flow_direction_d8, flow_direction_hybrid, resolve_filled_flats, transfer_shares,
        Accumulation, DepressionFill, FillParams, Partition, Propagation, RoutingStrategy,
    };
    pub use crate::pipeline::{HydrologyPipeline, PipelineConfig, PipelineOutput, Strategy};
    pub use crate::terrain::{classify_steepness, slope, Slope, SlopeParams, SteepnessParams};
    pub use hydroflow_core::prelude::*;
}
