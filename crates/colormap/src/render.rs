//! Raster-to-RGBA rendering.

use crate::scheme::{evaluate, ColorScheme, Rgb, DIRECTION_PALETTE};
use hydroflow_core::raster::{directions_in_mask, Raster, RasterElement};

/// RGBA for NODATA and undefined cells: opaque black.
pub const NODATA_COLOR: [u8; 4] = [0, 0, 0, 255];

/// How values are normalized into [0, 1] before colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stretch {
    #[default]
    Linear,
    /// `ln(1 + v - min) / ln(1 + max - min)`, for heavy-tailed data such as
    /// flow accumulation
    Log,
}

impl Stretch {
    fn normalize(self, v: f64, min: f64, max: f64) -> f64 {
        let range = max - min;
        if range.abs() <= f64::EPSILON {
            return 0.0;
        }
        match self {
            Stretch::Linear => (v - min) / range,
            Stretch::Log => (v - min).max(0.0).ln_1p() / range.max(0.0).ln_1p(),
        }
    }
}

/// Parameters for continuous rendering.
#[derive(Debug, Clone)]
pub struct ColormapParams {
    pub scheme: ColorScheme,
    /// Value drawn with the first colour of the scheme; lower values clamp
    pub min: f64,
    /// Value drawn with the last colour of the scheme; higher values clamp
    pub max: f64,
    pub stretch: Stretch,
    pub nodata_color: [u8; 4],
}

impl ColormapParams {
    pub fn with_range(scheme: ColorScheme, min: f64, max: f64) -> Self {
        Self {
            scheme,
            min,
            max,
            stretch: Stretch::Linear,
            nodata_color: NODATA_COLOR,
        }
    }

    pub fn with_stretch(mut self, stretch: Stretch) -> Self {
        self.stretch = stretch;
        self
    }
}

/// Params spanning the valid (non-NODATA, finite) range of `raster`.
///
/// An all-NODATA raster maps over [0, 1]; a constant raster over
/// [v, v + 1].
pub fn auto_params<T: RasterElement>(raster: &Raster<T>, scheme: ColorScheme) -> ColormapParams {
    let nodata = raster.nodata();
    let (min, max) = raster
        .data()
        .iter()
        .filter(|v| !v.is_nodata(nodata))
        .filter_map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    let (min, max) = if !min.is_finite() || !max.is_finite() {
        (0.0, 1.0)
    } else if (max - min).abs() < f64::EPSILON {
        (min, min + 1.0)
    } else {
        (min, max)
    };
    ColormapParams::with_range(scheme, min, max)
}

/// Render a continuous raster as row-major RGBA bytes (`rows * cols * 4`).
pub fn raster_to_rgba<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams) -> Vec<u8> {
    let nodata = raster.nodata();
    let mut rgba = Vec::with_capacity(raster.len() * 4);

    for val in raster.data().iter() {
        let pixel = match val.to_f64() {
            Some(v) if v.is_finite() && !val.is_nodata(nodata) => {
                let t = params.stretch.normalize(v, params.min, params.max);
                evaluate(params.scheme, t).to_rgba()
            }
            _ => params.nodata_color,
        };
        rgba.extend_from_slice(&pixel);
    }
    rgba
}

/// Render a class raster: each value indexes `palette`. NODATA and values
/// without a palette entry are drawn black.
pub fn classes_to_rgba<T: RasterElement>(raster: &Raster<T>, palette: &[Rgb]) -> Vec<u8> {
    let nodata = raster.nodata();
    let mut rgba = Vec::with_capacity(raster.len() * 4);

    for val in raster.data().iter() {
        let class = (!val.is_nodata(nodata))
            .then(|| val.to_f64())
            .flatten()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0)
            .and_then(|v| palette.get(v as usize));
        rgba.extend_from_slice(&class.map_or(NODATA_COLOR, |c| c.to_rgba()));
    }
    rgba
}

/// Render a direction field. A single code takes its direction's colour,
/// a multi-direction mask the mean of its directions' colours. NODATA,
/// no-flow and out-of-range values are drawn black.
pub fn directions_to_rgba(raster: &Raster<i32>) -> Vec<u8> {
    let nodata = raster.nodata();
    let mut rgba = Vec::with_capacity(raster.len() * 4);

    for &code in raster.data().iter() {
        let pixel = if code.is_nodata(nodata) || !(1..=255).contains(&code) {
            NODATA_COLOR
        } else {
            blend(directions_in_mask(code).map(|d| DIRECTION_PALETTE[d.index()])).to_rgba()
        };
        rgba.extend_from_slice(&pixel);
    }
    rgba
}

fn blend(colors: impl Iterator<Item = Rgb>) -> Rgb {
    let (mut r, mut g, mut b, mut n) = (0.0, 0.0, 0.0, 0.0);
    for c in colors {
        r += c.r as f64;
        g += c.g as f64;
        b += c.b as f64;
        n += 1.0;
    }
    if n == 0.0 {
        return Rgb::BLACK;
    }
    Rgb::new(
        (r / n).round() as u8,
        (g / n).round() as u8,
        (b / n).round() as u8,
    )
}
