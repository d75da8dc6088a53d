//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// North-up affine transformation between cell indices and map coordinates.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `origin` is the upper-left corner of the grid and `pixel_height` is
/// negative. ESRI ASCII grids describe the same thing from the lower-left
/// corner, see [`GeoTransform::from_lower_left`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new north-up transform from the upper-left corner
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Create a transform from an ESRI-style lower-left corner and square cell size
    pub fn from_lower_left(xll: f64, yll: f64, cell_size: f64, rows: usize) -> Self {
        Self::new(xll, yll + rows as f64 * cell_size, cell_size, -cell_size)
    }

    /// Lower-left corner of a grid with `rows` rows
    pub fn lower_left(&self, rows: usize) -> (f64, f64) {
        (self.origin_x, self.origin_y + rows as f64 * self.pixel_height)
    }

    /// Get the cell size (assumes square pixels)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Bounding box (min_x, min_y, max_x, max_y) for a raster of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let x0 = self.origin_x;
        let x1 = self.origin_x + width as f64 * self.pixel_width;
        let y0 = self.origin_y;
        let y1 = self.origin_y + height as f64 * self.pixel_height;
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
