//! PNG output of rendered RGBA buffers.

use hydroflow_core::{Error, Result};
use image::{ImageError, ImageFormat, RgbaImage};
use std::path::Path;
use tracing::debug;

/// Write a row-major RGBA buffer of `rows x cols` pixels as a PNG.
pub fn write_png<P: AsRef<Path>>(path: P, rows: usize, cols: usize, rgba: Vec<u8>) -> Result<()> {
    let path = path.as_ref();
    let invalid = || Error::InvalidDimensions {
        width: cols,
        height: rows,
    };
    let width = u32::try_from(cols).map_err(|_| invalid())?;
    let height = u32::try_from(rows).map_err(|_| invalid())?;
    let image = RgbaImage::from_raw(width, height, rgba).ok_or_else(invalid)?;

    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| match e {
            ImageError::IoError(io) => Error::Io(io),
            other => Error::Other(format!("PNG encoding failed: {}", other)),
        })?;
    debug!(path = %path.display(), rows, cols, "wrote PNG");
    Ok(())
}
