use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand, ValueEnum};
use geotiler_tile_utils::TileCoord;
use tracing::debug;

use crate::config::Config;

/// Defines the styles used for the CLI help output.
const HELP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Blue.on_default().bold())
    .usage(AnsiColor::Blue.on_default().bold())
    .literal(AnsiColor::White.on_default())
    .placeholder(AnsiColor::Green.on_default());

#[derive(Parser, Debug, PartialEq)]
#[command(
    about,
    version,
    after_help = "Use RUST_LOG environment variable to control logging level, e.g. RUST_LOG=debug or RUST_LOG=geotiler=debug. Use GEOTILER_FORMAT to pick the log format (json, full, compact, bare, pretty).",
    styles = HELP_STYLES
)]
pub struct Args {
    #[command(flatten)]
    pub meta: MetaArgs,
    #[command(flatten)]
    pub options: OptionArgs,
    #[command(subcommand)]
    pub command: Command,
}

// None of these params will be transferred to the config
#[derive(Parser, Debug, Clone, PartialEq, Default)]
pub struct MetaArgs {
    /// Path to a YAML config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Save resulting config to a file or use "-" to print to stdout.
    #[arg(long, global = true)]
    pub save_config: Option<PathBuf>,
}

/// Overrides of the config file values.
#[derive(Parser, Debug, Clone, PartialEq, Default)]
pub struct OptionArgs {
    /// Deepest zoom level of the simplification index [default: 18]
    #[arg(long, global = true)]
    pub maxzoom: Option<u8>,
    /// Tile buffer on each side, in units of a 4096 wide tile [default: 128]
    #[arg(long, global = true)]
    pub buffer: Option<u16>,
    /// Simplification tolerance, higher means simpler [default: 0.375]
    #[arg(long, global = true)]
    pub tolerance: Option<f64>,
    /// Cluster point features instead of simplifying them.
    #[arg(long, global = true)]
    pub cluster: bool,
    /// Cluster radius, in pixels of a 512 pixel tile [default: 50]
    #[arg(long, global = true)]
    pub cluster_radius: Option<u16>,
    /// Points are no longer clustered at this zoom and deeper [default: 17]
    #[arg(long, global = true)]
    pub cluster_max_zoom: Option<u8>,
    /// Tile cache size in megabytes, 0 to disable [default: 64]
    #[arg(long, global = true)]
    pub cache_size: Option<u64>,
    /// Include the expansion zoom of every cluster in tile summaries.
    #[arg(long, global = true)]
    pub expand_clusters: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Load the data and print a summary of the source.
    Info {
        /// Path or URL of a `GeoJSON` document.
        input: Option<String>,
    },
    /// Print a summary of a tile, or write it as a Mapbox Vector Tile.
    Tile {
        /// Tile address, e.g. 4/8/5
        xyz: TileCoord,
        /// Path or URL of a `GeoJSON` document.
        input: Option<String>,
        #[arg(short, long, value_enum, default_value_t)]
        format: TileFormat,
        /// Write the tile to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the sub-clusters or the points of a cluster as `GeoJSON`.
    Expand {
        /// Cluster id, as found in the `cluster_id` property of a marker.
        cluster_id: u64,
        /// Path or URL of a `GeoJSON` document.
        input: Option<String>,
    },
}

impl Command {
    #[must_use]
    pub fn input(&self) -> Option<&str> {
        match self {
            Self::Info { input } | Self::Tile { input, .. } | Self::Expand { input, .. } => {
                input.as_deref()
            }
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Default, ValueEnum)]
pub enum TileFormat {
    /// JSON summary of the tile contents.
    #[default]
    Json,
    /// Mapbox Vector Tile bytes.
    Mvt,
}

impl Args {
    pub fn merge_into_config(&self, config: &mut Config) {
        if let Some(input) = self.command.input() {
            debug!("Using {input} as the data source");
            config.set_input(input.to_string());
        }
        self.options.merge_into_config(config);
    }
}

impl OptionArgs {
    fn merge_into_config(&self, config: &mut Config) {
        let options = &mut config.options;
        if let Some(maxzoom) = self.maxzoom {
            options.maxzoom = maxzoom;
        }
        if let Some(buffer) = self.buffer {
            options.buffer = buffer;
        }
        if let Some(tolerance) = self.tolerance {
            options.tolerance = tolerance;
        }
        if self.cluster {
            options.cluster = true;
        }
        if let Some(radius) = self.cluster_radius {
            options.cluster_radius = radius;
        }
        if let Some(zoom) = self.cluster_max_zoom {
            options.cluster_max_zoom = zoom;
        }
        if self.cache_size.is_some() {
            config.cache_size_mb = self.cache_size;
        }
        if self.expand_clusters {
            config.expand_clusters = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use geotiler_core::tiles::geojson::GeoJsonOptions;
    use insta::assert_yaml_snapshot;

    use super::*;

    fn parse(args: &[&str]) -> (Config, Args) {
        let args = Args::parse_from(args);
        let mut config = Config::default();
        args.merge_into_config(&mut config);
        (config, args)
    }

    #[test]
    fn cli_info() {
        let (config, args) = parse(&["geotiler", "info", "points.geojson"]);
        assert_eq!(
            args.command,
            Command::Info {
                input: Some("points.geojson".to_string())
            }
        );
        assert_eq!(args.meta, MetaArgs::default());
        assert_eq!(config.url.as_deref(), Some("points.geojson"));
        assert_eq!(config.options, GeoJsonOptions::default());
    }

    #[test]
    fn cli_tile() {
        let (_, args) = parse(&[
            "geotiler", "tile", "4/8/5", "a.geojson", "--format", "mvt", "-o", "t.mvt",
        ]);
        assert_eq!(
            args.command,
            Command::Tile {
                xyz: TileCoord::new_unchecked(4, 8, 5),
                input: Some("a.geojson".to_string()),
                format: TileFormat::Mvt,
                output: Some(PathBuf::from("t.mvt")),
            }
        );
    }

    #[test]
    fn cli_with_config() {
        let (config, args) = parse(&[
            "geotiler",
            "--config",
            "c.yaml",
            "expand",
            "17",
            "--save-config",
            "-",
        ]);
        assert_eq!(
            args.meta,
            MetaArgs {
                config: Some(PathBuf::from("c.yaml")),
                save_config: Some(PathBuf::from("-")),
            }
        );
        assert_eq!(
            args.command,
            Command::Expand {
                cluster_id: 17,
                input: None
            }
        );
        assert_eq!(config, Config::default());
    }

    #[test]
    fn cli_options_override_config() {
        let (config, _) = parse(&[
            "geotiler",
            "info",
            "https://example.org/stations.geojson",
            "--cluster",
            "--cluster-radius",
            "80",
            "--cluster-max-zoom",
            "12",
            "--maxzoom",
            "10",
            "--tolerance",
            "1.5",
            "--cache-size",
            "0",
        ]);
        assert_yaml_snapshot!(config, @r"
        id: geojson
        url: https://example.org/stations.geojson
        options:
          maxzoom: 10
          buffer: 128
          tolerance: 1.5
          cluster: true
          cluster-radius: 80
          cluster-max-zoom: 12
        cache_size_mb: 0
        expand_clusters: false
        ");
    }

    #[test]
    fn cli_bad_arguments() {
        for params in [
            ["geotiler"].as_slice(),
            ["geotiler", "tile", "1/2/0"].as_slice(),
            ["geotiler", "tile", "nope"].as_slice(),
            ["geotiler", "expand", "-1"].as_slice(),
            ["geotiler", "tile", "0/0/0", "--format", "png"].as_slice(),
        ] {
            let res = Args::try_parse_from(params);
            assert!(res.is_err(), "Expected error, got: {res:?} for {params:?}");
        }
    }
}
