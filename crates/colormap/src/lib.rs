//! # hydroflow Colormap
//!
//! Colour mapping and PNG rendering of hydroflow rasters.
//!
//! Continuous rasters (elevation, slope, accumulation) are stretched over a
//! multi-stop colour scheme with [`raster_to_rgba`]. Class rasters
//! (steepness) and direction fields have their own fixed palettes. NODATA
//! cells are drawn black.
//!
//! ## Usage
//!
//! ```ignore
//! use hydroflow_colormap::{auto_params, raster_to_rgba, write_png, ColorScheme};
//!
//! let params = auto_params(&filled, ColorScheme::Terrain);
//! let rgba = raster_to_rgba(&filled, &params);
//! write_png("filled.png", filled.rows(), filled.cols(), rgba)?;
//! ```

mod export;
mod render;
mod scheme;

pub use export::write_png;
pub use render::{
    auto_params, classes_to_rgba, directions_to_rgba, raster_to_rgba, ColormapParams, Stretch,
    NODATA_COLOR,
};
pub use scheme::{evaluate, ColorScheme, ColorStop, Rgb, DIRECTION_PALETTE, STEEPNESS_PALETTE};
