use std::io::Write;
use std::path::Path;

use geotiler_core::tiles::geojson::GeoJsonSource;
use geotiler_tile_utils::TileCoord;
use tracing::info;

use crate::args::{Command, TileFormat};
use crate::config::Config;
use crate::summary::{ExpansionSummary, SourceSummary, TileSummary};
use crate::{GeotilerError, GeotilerResult};

/// Loads the source described by `config` and runs `command` against it, printing to `out`.
pub async fn run(config: &Config, command: &Command, out: &mut impl Write) -> GeotilerResult<()> {
    let source = config.resolve().await?;
    match command {
        Command::Info { .. } => {
            write_json(out, &SourceSummary::new(&source))?;
        }
        Command::Tile {
            xyz, format, output, ..
        } => tile(config, &source, *xyz, *format, output.as_deref(), out)?,
        Command::Expand { cluster_id, .. } => {
            let expansion = source
                .expand_cluster(*cluster_id)
                .ok_or(GeotilerError::UnknownCluster(*cluster_id))?;
            let zoom = source.get_cluster_expansion_zoom(*cluster_id);
            write_json(out, &ExpansionSummary::new(*cluster_id, expansion, zoom))?;
        }
    }
    Ok(())
}

fn tile(
    config: &Config,
    source: &GeoJsonSource,
    xyz: TileCoord,
    format: TileFormat,
    output: Option<&Path>,
    out: &mut impl Write,
) -> GeotilerResult<()> {
    let data = match format {
        TileFormat::Json => {
            let contents = source.get_tile(xyz);
            let summary = TileSummary::new(xyz, &contents, |id| {
                if config.expand_clusters {
                    source.get_cluster_expansion_zoom(id)
                } else {
                    None
                }
            });
            let mut data = serde_json::to_vec_pretty(&summary)?;
            data.push(b'\n');
            data
        }
        TileFormat::Mvt => source.get_mvt_tile(xyz)?.data.to_vec(),
    };

    if let Some(path) = output {
        std::fs::write(path, &data)
            .map_err(|e| GeotilerError::OutputError(e, path.to_path_buf()))?;
        info!("Wrote {} bytes of tile {xyz} to {}", data.len(), path.display());
    } else {
        out.write_all(&data)?;
    }
    Ok(())
}

fn write_json(out: &mut impl Write, value: &impl serde::Serialize) -> GeotilerResult<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
