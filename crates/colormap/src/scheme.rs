//! Colour schemes and multi-stop interpolation.

/// RGB colour with channels in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Self = Self::new(0, 0, 0);

    /// Opaque RGBA bytes
    pub const fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

/// A colour stop: position in [0, 1] mapped to a colour.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Continuous colour schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorScheme {
    /// Green -> Yellow -> Brown -> White (elevation)
    Terrain,
    /// Black -> White (slope)
    Grayscale,
    /// Pale yellow -> Orange -> Brown (flow accumulation)
    Accumulation,
}

const TERRAIN_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 34, 139, 34),
    ColorStop::new(0.25, 144, 190, 60),
    ColorStop::new(0.50, 220, 200, 80),
    ColorStop::new(0.75, 180, 120, 60),
    ColorStop::new(1.00, 255, 255, 255),
];

const ACCUMULATION_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 255, 255, 212),
    ColorStop::new(0.25, 254, 217, 142),
    ColorStop::new(0.50, 254, 153, 41),
    ColorStop::new(0.75, 204, 76, 2),
    ColorStop::new(1.00, 102, 37, 6),
];

/// Steepness classes, indexed by class value: gentle (0) green, steep (1) red.
pub const STEEPNESS_PALETTE: &[Rgb] = &[Rgb::new(0, 200, 0), Rgb::new(220, 0, 0)];

/// One colour per D8 direction, in scan order (E, SE, S, SW, W, NW, N, NE).
pub const DIRECTION_PALETTE: [Rgb; 8] = [
    Rgb::new(255, 0, 255),   // E
    Rgb::new(0, 255, 255),   // SE
    Rgb::new(0, 0, 255),     // S
    Rgb::new(255, 255, 0),   // SW
    Rgb::new(0, 255, 0),     // W
    Rgb::new(255, 192, 203), // NW
    Rgb::new(255, 165, 0),   // N
    Rgb::new(255, 0, 0),     // NE
];

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    let (first, last) = (stops[0], stops[stops.len() - 1]);
    if t <= first.t {
        return first.color;
    }
    for pair in stops.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if t <= hi.t {
            return lerp_color(lo.color, hi.color, (t - lo.t) / (hi.t - lo.t));
        }
    }
    last.color
}

/// Evaluate a scheme at normalized position `t`; values outside [0, 1] clamp
/// to the end colours.
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    match scheme {
        ColorScheme::Terrain => multi_stop(TERRAIN_STOPS, t),
        ColorScheme::Grayscale => {
            let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
        ColorScheme::Accumulation => multi_stop(ACCUMULATION_STOPS, t),
    }
}
