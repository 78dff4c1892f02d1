#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

use std::f64::consts::PI;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Deepest zoom level a [`TileCoord`] may address.
pub const MAX_ZOOM: u8 = 30;

/// Latitude limit of the Web Mercator projection, in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Address of a single tile in the XYZ tiling scheme.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// Errors produced when a tile address cannot be parsed or is out of range.
#[non_exhaustive]
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TileCoordError {
    #[error("Zoom level {0} is greater than the maximum of {MAX_ZOOM}")]
    InvalidZoom(u8),

    #[error("Tile {x},{y} does not exist at zoom {z}")]
    OutOfRange { z: u8, x: u32, y: u32 },

    #[error("Unable to parse tile address '{0}', expected z/x/y")]
    Unparsable(String),
}

impl TileCoord {
    /// Creates a tile address, checking that `x` and `y` exist at zoom `z`.
    pub fn new_checked(z: u8, x: u32, y: u32) -> Result<Self, TileCoordError> {
        if z > MAX_ZOOM {
            return Err(TileCoordError::InvalidZoom(z));
        }
        let size = Self::tiles_per_side(z);
        if u64::from(x) >= size || u64::from(y) >= size {
            return Err(TileCoordError::OutOfRange { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    /// Creates a tile address without validating it.
    #[must_use]
    pub fn new_unchecked(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one side of the world at zoom `z`, saturating at `u64::MAX`.
    #[must_use]
    pub fn tiles_per_side(z: u8) -> u64 {
        1_u64.checked_shl(u32::from(z)).unwrap_or(u64::MAX)
    }

    /// The tile at zoom `z` containing this tile, or this tile itself when `z` is not shallower.
    #[must_use]
    pub fn ancestor(&self, z: u8) -> Self {
        if z >= self.z {
            return *self;
        }
        let dz = u32::from(self.z - z);
        Self {
            z,
            x: self.x.checked_shr(dz).unwrap_or(0),
            y: self.y.checked_shr(dz).unwrap_or(0),
        }
    }

    /// Bounds of this tile in unit-square (projected) space as `[min_x, min_y, max_x, max_y]`.
    #[must_use]
    pub fn unit_bounds(&self) -> [f64; 4] {
        #[allow(clippy::cast_precision_loss)]
        let size = Self::tiles_per_side(self.z) as f64;
        [
            f64::from(self.x) / size,
            f64::from(self.y) / size,
            (f64::from(self.x) + 1.0) / size,
            (f64::from(self.y) + 1.0) / size,
        ]
    }

    /// WGS84 bounds of this tile as `[west, south, east, north]`.
    #[must_use]
    pub fn wgs84_bounds(&self) -> [f64; 4] {
        let [min_x, min_y, max_x, max_y] = self.unit_bounds();
        [
            unit_x_to_lng(min_x),
            unit_y_to_lat(max_y),
            unit_x_to_lng(max_x),
            unit_y_to_lat(min_y),
        ]
    }
}

impl Display for TileCoord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "{}/{}/{}", self.z, self.x, self.y)
        } else {
            write!(f, "{},{},{}", self.z, self.x, self.y)
        }
    }
}

impl FromStr for TileCoord {
    type Err = TileCoordError;

    /// Parses `z/x/y` (or `z,x,y`) into a validated tile address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TileCoordError::Unparsable(s.to_string());
        let mut parts = s.trim().split(['/', ',']);
        let z = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let x = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        let y = parts.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        if parts.next().is_some() {
            return Err(err());
        }
        Self::new_checked(z, x, y)
    }
}

/// Project a longitude to the `[0, 1]` unit-square x axis.
#[must_use]
pub fn lng_to_unit_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Project a latitude to the `[0, 1]` unit-square y axis (y grows southwards).
#[must_use]
pub fn lat_to_unit_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

/// Inverse of [`lng_to_unit_x`].
#[must_use]
pub fn unit_x_to_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

/// Inverse of [`lat_to_unit_y`].
#[must_use]
pub fn unit_y_to_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}

/// Convert a unit-square coordinate into the local coordinate space of `tile`,
/// where `0..extent` covers the tile itself.
#[must_use]
pub fn unit_to_tile_local(x: f64, y: f64, tile: TileCoord, extent: u32) -> (i32, i32) {
    #[allow(clippy::cast_precision_loss)]
    let size = TileCoord::tiles_per_side(tile.z) as f64;
    let extent = f64::from(extent);
    let tx = (extent * (x * size - f64::from(tile.x))).round();
    let ty = (extent * (y * size - f64::from(tile.y))).round();
    #[allow(clippy::cast_possible_truncation)]
    (tx as i32, ty as i32)
}
