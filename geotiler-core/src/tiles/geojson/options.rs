use serde::{Deserialize, Serialize};

use super::{GeoJsonError, GeoJsonResult};

/// Size of a tile in tile-local coordinate units, used for both simplification and output.
pub const TILE_EXTENT: u32 = 4096;

/// Deepest `maxzoom` a source accepts.
pub const MAX_SOURCE_ZOOM: u8 = 22;

/// Deepest `cluster_max_zoom` a source accepts.
pub const MAX_CLUSTER_ZOOM: u8 = 24;

/// Immutable tiling and clustering parameters of a `GeoJSON` source.
///
/// Set once when the source is created. Changing any of them requires a new source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeoJsonOptions {
    /// Deepest zoom level the simplification index is built for.
    /// Deeper tile requests are overzoomed from this level.
    #[serde(default = "GeoJsonOptions::default_maxzoom")]
    pub maxzoom: u8,
    /// Tile buffer on each side, in tile units (a tile is [`TILE_EXTENT`] units wide).
    #[serde(default = "GeoJsonOptions::default_buffer")]
    pub buffer: u16,
    /// Simplification tolerance (higher means simpler).
    #[serde(default = "GeoJsonOptions::default_tolerance")]
    pub tolerance: f64,
    /// Cluster point features instead of simplifying the document.
    #[serde(default)]
    pub cluster: bool,
    /// Radius of each cluster, in pixels of a 512 pixel tile.
    #[serde(default = "GeoJsonOptions::default_cluster_radius")]
    pub cluster_radius: u16,
    /// Points are no longer merged at this zoom level and deeper.
    #[serde(default = "GeoJsonOptions::default_cluster_max_zoom")]
    pub cluster_max_zoom: u8,
}

impl Default for GeoJsonOptions {
    fn default() -> Self {
        Self {
            maxzoom: Self::default_maxzoom(),
            buffer: Self::default_buffer(),
            tolerance: Self::default_tolerance(),
            cluster: false,
            cluster_radius: Self::default_cluster_radius(),
            cluster_max_zoom: Self::default_cluster_max_zoom(),
        }
    }
}

impl GeoJsonOptions {
    fn default_maxzoom() -> u8 {
        18
    }

    fn default_buffer() -> u16 {
        128
    }

    fn default_tolerance() -> f64 {
        0.375
    }

    fn default_cluster_radius() -> u16 {
        50
    }

    fn default_cluster_max_zoom() -> u8 {
        17
    }

    /// Options for a clustering source with the given radius and maximum cluster zoom.
    #[must_use]
    pub fn clustered(cluster_radius: u16, cluster_max_zoom: u8) -> Self {
        Self {
            cluster: true,
            cluster_radius,
            cluster_max_zoom,
            ..Self::default()
        }
    }

    /// Checks that all values are within their accepted ranges.
    pub fn validate(&self) -> GeoJsonResult<()> {
        if self.maxzoom > MAX_SOURCE_ZOOM {
            return Err(GeoJsonError::InvalidOptions(format!(
                "maxzoom {} is greater than {MAX_SOURCE_ZOOM}",
                self.maxzoom
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(GeoJsonError::InvalidOptions(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.cluster_max_zoom > MAX_CLUSTER_ZOOM {
            return Err(GeoJsonError::InvalidOptions(format!(
                "cluster-max-zoom {} is greater than {MAX_CLUSTER_ZOOM}",
                self.cluster_max_zoom
            )));
        }
        if self.cluster && self.cluster_radius == 0 {
            return Err(GeoJsonError::InvalidOptions(
                "cluster-radius must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Tile buffer as a fraction of a tile.
    #[must_use]
    pub(crate) fn buffer_ratio(&self) -> f64 {
        f64::from(self.buffer) / f64::from(TILE_EXTENT)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults() {
        let options = GeoJsonOptions::default();
        assert_eq!(options.maxzoom, 18);
        assert_eq!(options.buffer, 128);
        assert!((options.tolerance - 0.375).abs() < f64::EPSILON);
        assert!(!options.cluster);
        assert_eq!(options.cluster_radius, 50);
        assert_eq!(options.cluster_max_zoom, 17);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn deserializes_partial_config() {
        let options: GeoJsonOptions =
            serde_json::from_str(r#"{"cluster": true, "cluster-radius": 80}"#).unwrap();
        assert_eq!(
            options,
            GeoJsonOptions {
                cluster: true,
                cluster_radius: 80,
                ..GeoJsonOptions::default()
            }
        );
    }

    #[rstest]
    #[case(GeoJsonOptions { maxzoom: 23, ..GeoJsonOptions::default() })]
    #[case(GeoJsonOptions { tolerance: -1.0, ..GeoJsonOptions::default() })]
    #[case(GeoJsonOptions { tolerance: f64::NAN, ..GeoJsonOptions::default() })]
    #[case(GeoJsonOptions { cluster_max_zoom: 25, ..GeoJsonOptions::default() })]
    #[case(GeoJsonOptions::clustered(0, 14))]
    fn rejects_out_of_range(#[case] options: GeoJsonOptions) {
        assert!(matches!(
            options.validate(),
            Err(GeoJsonError::InvalidOptions(_))
        ));
    }
}
