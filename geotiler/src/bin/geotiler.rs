use std::env;

use clap::Parser;
use geotiler::GeotilerResult;
use geotiler::args::Args;
use geotiler::commands::run;
use geotiler::config::{Config, read_config};
use geotiler::logging::{ensure_core_log_level_matches, init_tracing};
use tracing::{debug, error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

async fn start(args: Args) -> GeotilerResult<()> {
    debug!("Starting geotiler v{VERSION}");

    let mut config = if let Some(ref cfg_filename) = args.meta.config {
        info!("Using {}", cfg_filename.display());
        read_config(cfg_filename)?
    } else {
        Config::default()
    };

    args.merge_into_config(&mut config);
    config.finalize()?;

    if let Some(file_name) = &args.meta.save_config {
        config.save_to_file(file_name)?;
    }

    let stdout = std::io::stdout();
    run(&config, &args.command, &mut stdout.lock()).await
}

#[tokio::main]
async fn main() {
    let filter = ensure_core_log_level_matches(env::var("RUST_LOG").ok(), "geotiler=");
    init_tracing(&filter, env::var("GEOTILER_FORMAT").ok());

    let args = Args::parse();
    if let Err(e) = start(args).await {
        // Ensure the message is printed, even if the logging is disabled
        if log::log_enabled!(log::Level::Error) {
            error!("{e}");
        } else {
            eprintln!("{e}");
        }
        std::process::exit(1);
    }
}
