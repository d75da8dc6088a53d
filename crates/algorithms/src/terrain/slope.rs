//! Slope calculation from integer DEMs
//!
//! Uses centered finite differences along each axis:
//! ```text
//! dz/dx = (z[r][c+1] - z[r][c-1]) / (2 * cellsize)
//! dz/dy = (z[r+1][c] - z[r-1][c]) / (2 * cellsize)
//! slope = atan(sqrt(dz/dx² + dz/dy²))
//! ```
//! An axis whose two neighbours are not both present and valid contributes a
//! zero derivative, so edge cells still get a slope.

use crate::maybe_rayon::*;
use hydroflow_core::raster::Raster;
use hydroflow_core::{Algorithm, Error, Result};
use ndarray::Array2;

/// Parameters for slope calculation
#[derive(Debug, Clone, Default)]
pub struct SlopeParams {
    /// Cell size override; when `None` the raster's transform is used
    pub cell_size: Option<f64>,
}

/// Slope algorithm
#[derive(Debug, Clone, Default)]
pub struct Slope;

impl Algorithm for Slope {
    type Input = Raster<i32>;
    type Output = Raster<f64>;
    type Params = SlopeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Slope"
    }

    fn description(&self) -> &'static str {
        "Calculate slope in degrees from a DEM using centered differences"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        slope(&input, params)
    }
}

/// Calculate slope in degrees from a DEM.
///
/// NODATA cells become NaN in the output.
///
/// # Errors
/// `Error::InvalidParameter` when the effective cell size is not a positive
/// finite number.
pub fn slope(dem: &Raster<i32>, params: SlopeParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let cell_size = params.cell_size.unwrap_or_else(|| dem.cell_size());

    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(Error::InvalidParameter {
            name: "cell_size",
            value: cell_size.to_string(),
            reason: "must be a positive finite number".into(),
        });
    }

    let two_cell_size = 2.0 * cell_size;

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                if !dem.is_valid(row, col) {
                    continue;
                }

                let dz_dx = centered_difference(dem, (row, col.wrapping_sub(1)), (row, col + 1));
                let dz_dy = centered_difference(dem, (row.wrapping_sub(1), col), (row + 1, col));

                let dz_dx = dz_dx / two_cell_size;
                let dz_dy = dz_dy / two_cell_size;

                *out = dz_dx.hypot(dz_dy).atan().to_degrees();
            }

            row_data
        })
        .collect();

    let mut output = dem.with_same_meta::<f64>();
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// `z(after) - z(before)`, or zero unless both cells exist and hold data.
///
/// Out-of-grid positions arrive as wrapped indices and fail `is_valid`.
#[inline]
fn centered_difference(dem: &Raster<i32>, before: (usize, usize), after: (usize, usize)) -> f64 {
    if !dem.is_valid(before.0, before.1) || !dem.is_valid(after.0, after.1) {
        return 0.0;
    }
    // Both cells were just checked in bounds.
    let (lo, hi) = unsafe {
        (
            dem.get_unchecked(before.0, before.1),
            dem.get_unchecked(after.0, after.1),
        )
    };
    f64::from(hi) - f64::from(lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hydroflow_core::GeoTransform;

    fn plane(rows: usize, cols: usize, f: impl Fn(usize, usize) -> i32) -> Raster<i32> {
        let data = (0..rows * cols).map(|i| f(i / cols, i % cols)).collect();
        let mut dem = Raster::from_vec(data, rows, cols).unwrap();
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        dem.set_nodata(Some(-9999));
        dem
    }

    #[test]
    fn test_slope_flat() {
        let dem = plane(5, 5, |_, _| 100);
        let result = slope(&dem, SlopeParams::default()).unwrap();

        for &v in result.data().iter() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_slope_ramp_along_columns() {
        // One unit rise per unit run gives 45 degrees.
        let dem = plane(5, 5, |_, c| c as i32);
        let result = slope(&dem, SlopeParams::default()).unwrap();

        assert_relative_eq!(result.get(2, 2).unwrap(), 45.0, epsilon = 1e-9);
        // Edge columns lack one neighbour along x and read as flat.
        assert_eq!(result.get(2, 0).unwrap(), 0.0);
        assert_eq!(result.get(2, 4).unwrap(), 0.0);
    }

    #[test]
    fn test_slope_uses_cell_size_override() {
        let dem = plane(3, 3, |r, _| 10 * r as i32);
        let result = slope(&dem, SlopeParams { cell_size: Some(10.0) }).unwrap();

        assert_relative_eq!(result.get(1, 1).unwrap(), 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_slope_nodata_is_nan_and_neighbours_ignore_it() {
        let mut dem = plane(3, 3, |_, c| 2 * c as i32);
        dem.set(1, 0, -9999).unwrap();

        let result = slope(&dem, SlopeParams::default()).unwrap();

        assert!(result.get(1, 0).unwrap().is_nan());
        // The x difference at (1, 1) needs (1, 0), so only the y axis counts.
        assert_eq!(result.get(1, 1).unwrap(), 0.0);
        assert!(result.get(0, 1).unwrap() > 0.0);
    }

    #[test]
    fn test_slope_rejects_bad_cell_size() {
        let dem = plane(3, 3, |_, _| 1);
        let err = slope(&dem, SlopeParams { cell_size: Some(0.0) }).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "cell_size", .. }));
    }
}
