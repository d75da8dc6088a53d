//! Hydrological analysis algorithms
//!
//! Algorithms for conditioning and routing flow over integer DEMs:
//! - Depression filling: partitioned Priority-Flood (Barnes 2014)
//! - Flow direction: D8 with filled-flat resolution, or hybrid D8/MFD
//! - Flow accumulation: upstream cell counts (D8) or weighted area (hybrid)
//! - Routing strategy: one switch between the D8 and hybrid chains

mod flow_accumulation;
mod flow_accumulation_hybrid;
pub(crate) mod flow_direction;
pub(crate) mod flow_direction_hybrid;
mod partition;
mod priority_flood;
mod routing;

pub use flow_accumulation::{flow_accumulation_d8, FlowAccumulation, Propagation};
pub use flow_accumulation_hybrid::flow_accumulation_hybrid;
pub use flow_direction::{flow_direction_d8, resolve_filled_flats, FlowDirection};
pub use flow_direction_hybrid::{flow_direction_hybrid, transfer_shares, SHARE_THRESHOLD, SLOPE_EXPONENT};
pub use partition::Partition;
pub use priority_flood::{fill_depressions, DepressionFill, FillParams, DEFAULT_LEAF_CELLS};
pub use routing::{Accumulation, RoutingStrategy};
