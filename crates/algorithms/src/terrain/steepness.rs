//! Steep/gentle classification of a slope field

use hydroflow_core::raster::Raster;
use hydroflow_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Mask value for cells steeper than the threshold
pub const STEEP: u8 = 1;
/// Mask value for cells at or below the threshold
pub const GENTLE: u8 = 0;
/// Mask value for cells without a slope
pub const STEEPNESS_NODATA: u8 = u8::MAX;

/// Parameters for steepness classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SteepnessParams {
    /// Slopes strictly above this angle (degrees) are steep
    pub threshold_degrees: f64,
}

impl Default for SteepnessParams {
    fn default() -> Self {
        Self {
            threshold_degrees: 20.0,
        }
    }
}

/// Classify every cell of a slope raster as steep, gentle or NODATA.
pub fn classify_steepness(slope: &Raster<f64>, params: SteepnessParams) -> Result<Raster<u8>> {
    let threshold = params.threshold_degrees;
    if threshold.is_nan() {
        return Err(Error::InvalidParameter {
            name: "threshold_degrees",
            value: threshold.to_string(),
            reason: "must be a number".into(),
        });
    }

    let mut output = slope.with_same_meta::<u8>();
    output.set_nodata(Some(STEEPNESS_NODATA));

    ndarray::Zip::from(output.data_mut())
        .and(slope.data())
        .for_each(|out, &s| {
            *out = if s.is_nan() {
                STEEPNESS_NODATA
            } else if s > threshold {
                STEEP
            } else {
                GENTLE
            };
        });

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_exclusive() {
        let slope = Raster::from_vec(vec![0.0, 20.0, 20.5, f64::NAN], 2, 2).unwrap();
        let mask = classify_steepness(&slope, SteepnessParams::default()).unwrap();

        assert_eq!(mask.get(0, 0).unwrap(), GENTLE);
        assert_eq!(mask.get(0, 1).unwrap(), GENTLE);
        assert_eq!(mask.get(1, 0).unwrap(), STEEP);
        assert_eq!(mask.get(1, 1).unwrap(), STEEPNESS_NODATA);
        assert_eq!(mask.nodata(), Some(STEEPNESS_NODATA));
    }

    #[test]
    fn test_custom_threshold() {
        let slope = Raster::from_vec(vec![5.0, 10.0], 1, 2).unwrap();
        let mask = classify_steepness(&slope, SteepnessParams { threshold_degrees: 7.5 }).unwrap();
        assert_eq!(mask.data().as_slice().unwrap(), &[GENTLE, STEEP]);
    }
}
