//! Fixed-point earth geometry.
//!
//! Geographic points are projected onto a unit sphere scaled to
//! `i32::MAX`, giving one signed 32-bit integer per axis at roughly 3mm
//! ground resolution. Integer coordinates make spatial comparisons exact,
//! which the K-D tree's median splits depend on.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// One axis of a fixed-point earth coordinate.
pub type EarthLoc = i32;

/// A projected 3-D earth coordinate.
pub type Coords = [EarthLoc; 3];

/// Squared distances accumulate three products of 33-bit differences, so
/// they need a type wider than 64 bits.
pub type SqDist = i128;

/// A unit of pi / 2^31 radians, roughly 1 meter of arc at the equator.
pub type ScaledRad = i32;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

const COORD_SCALE: f64 = i32::MAX as f64;

/// Scale an angle in `[-180, 180)` degrees to [`ScaledRad`]. Out-of-range
/// input is a caller bug.
pub fn scale_degrees(deg: f64) -> ScaledRad {
    assert!(
        (-180.0..180.0).contains(&deg),
        "degree out of range: {deg:.12}"
    );
    ((deg / 180.0) * (1u64 << 31) as f64) as ScaledRad
}

/// A (latitude, longitude) pair in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SphereCoords {
    pub lat: f64,
    pub long: f64,
}

impl SphereCoords {
    pub fn new(lat: f64, long: f64) -> SphereCoords {
        SphereCoords { lat, long }
    }

    /// (0, 0) is the "unknown position" sentinel used by geocoding
    /// collaborators; it is in the Gulf of Guinea, not on any road.
    pub fn defined(&self) -> bool {
        self.lat != 0.0 || self.long != 0.0
    }

    /// Project onto the scaled unit sphere.
    pub fn to_coords(&self) -> Coords {
        let lat = self.lat.to_radians();
        let long = self.long.to_radians();
        [
            (lat.cos() * long.cos() * COORD_SCALE) as EarthLoc,
            (lat.cos() * long.sin() * COORD_SCALE) as EarthLoc,
            (lat.sin() * COORD_SCALE) as EarthLoc,
        ]
    }
}

impl fmt::Display for SphereCoords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.defined() {
            return write!(f, "unknown");
        }
        write!(
            f,
            "{},{}",
            fmt_degree(self.lat, 'N', 'S'),
            fmt_degree(self.long, 'E', 'W')
        )
    }
}

fn fmt_degree(d: f64, pos: char, neg: char) -> String {
    if d < 0.0 {
        format!("{:.2}°{}", -d, neg)
    } else {
        format!("{d:.2}°{pos}")
    }
}

/// A (city, state) place-name pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CityState {
    pub city: String,
    pub state: String,
}

impl CityState {
    pub fn new(city: &str, state: &str) -> CityState {
        CityState {
            city: city.to_string(),
            state: state.to_string(),
        }
    }
}

impl fmt::Display for CityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.city, self.state)
    }
}

/// Squared distance between two projected points.
pub fn sq_dist(a: Coords, b: Coords) -> SqDist {
    let mut acc: SqDist = 0;
    for axis in 0..3 {
        let d = a[axis] as i64 - b[axis] as i64;
        acc += d as SqDist * d as SqDist;
    }
    acc
}

/// Squared single-axis distance, in the same units as [`sq_dist`].
pub fn sq_axis_dist(a: EarthLoc, b: EarthLoc) -> SqDist {
    let d = a as i64 - b as i64;
    d as SqDist * d as SqDist
}

/// Great-circle distance in meters between two projected points: chord
/// length between the scaled unit vectors, converted to arc length.
pub fn great_circle_distance(a: Coords, b: Coords) -> f64 {
    let chord = (sq_dist(a, b) as f64).sqrt() / COORD_SCALE;
    2.0 * (chord / 2.0).clamp(0.0, 1.0).asin() * EARTH_RADIUS_METERS
}

static DEG_MIN_SEC: Lazy<Regex> = Lazy::new(|| {
    let num = r"(\d+(?:\.\d+)?)";
    Regex::new(&format!("{num}°(?:{num}′)?(?:{num}″)?([NSWE])")).unwrap()
});

/// Parse a degree-minute-second coordinate string such as `40°38′23″N`.
/// Minutes and seconds are optional; south and west are negative.
pub fn parse_degrees(text: &str) -> Option<f64> {
    let caps = DEG_MIN_SEC.captures(text)?;
    let part = |i: usize| {
        caps.get(i)
            .map(|m| m.as_str().parse::<f64>().unwrap_or(0.0))
            .unwrap_or(0.0)
    };
    let angle = part(1) + part(2) / 60.0 + part(3) / 3600.0;
    match caps.get(4).map(|m| m.as_str()) {
        Some("S") | Some("W") => Some(-angle),
        _ => Some(angle),
    }
}
