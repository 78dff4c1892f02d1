//! Keeps a `GeoJSON` source in sync with a file or URL and prints a tile after every reload.
//!
//! ```sh
//! cargo run -p geotiler-core --example live-source -- data.geojson 2/1/1
//! ```

use std::time::Duration;

use geotiler_core::tiles::geojson::{GeoJsonOptions, GeoJsonSource, SourceEvent};
use geotiler_tile_utils::TileCoord;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().ok_or("usage: live-source <url-or-path> [z/x/y]")?;
    let xyz: TileCoord = args.next().as_deref().unwrap_or("0/0/0").parse()?;

    let source = GeoJsonSource::new("live", GeoJsonOptions::default())?;
    let mut events = source.subscribe();
    source.set_url(&url);

    let mut reload = tokio::time::interval(Duration::from_secs(10));
    reload.tick().await;
    loop {
        tokio::select! {
            _ = reload.tick() => {
                source.set_url(&url);
            }
            event = events.recv() => match event? {
                SourceEvent::IndexInstalled { generation } => {
                    let tile = source.get_mvt_tile(xyz)?;
                    println!(
                        "generation {generation}: tile {xyz} has {} entries, {} bytes, etag {}",
                        source.get_tile(xyz).len(),
                        tile.data.len(),
                        tile.etag
                    );
                }
                SourceEvent::Failed(error) => eprintln!("{error}"),
                _ => {}
            }
        }
    }
}
