use std::ffi::OsStr;
use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use geotiler_core::fetch::DefaultFetcher;
use geotiler_core::tiles::TileCache;
use geotiler_core::tiles::geojson::{GeoJsonOptions, GeoJsonSource, SourceEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{GeotilerError, GeotilerResult};

/// Size of the tile cache when the config does not set one.
pub const DEFAULT_CACHE_SIZE_MB: u64 = 64;

pub type ConfigFileResult<T> = Result<T, ConfigFileError>;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum ConfigFileError {
    #[error("Unable to load config file {1}: {0}")]
    ConfigLoadError(#[source] std::io::Error, PathBuf),

    #[error("Unable to substitute environment variables in config file {1}: {0}")]
    ConfigSubstitutionError(#[source] subst::Error, PathBuf),

    #[error("Unable to parse config file {1}: {0}")]
    ConfigParseError(#[source] serde_yaml::Error, PathBuf),

    #[error("Unable to serialize config: {0}")]
    ConfigSerializeError(#[source] serde_yaml::Error),

    #[error("Unable to write config file {1}: {0}")]
    ConfigWriteError(#[source] std::io::Error, PathBuf),

    #[error("Only one of url, path and inline may be set, found {0}")]
    MultipleInputs(String),
}

/// Where the data of the source comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum Input<'a> {
    /// Fetched: a URL or a local path.
    Url(&'a str),
    /// Inline `GeoJSON`.
    Inline(&'a serde_json::Value),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Source id, used as the MVT layer name.
    #[serde(default = "Config::default_id")]
    pub id: String,

    /// URL of the `GeoJSON` document (`file://`, `http://` or `https://`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Path of a local `GeoJSON` file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// The `GeoJSON` document itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<serde_json::Value>,

    #[serde(default)]
    pub options: GeoJsonOptions,

    /// Maximum size of the tile cache in megabytes (0 to disable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size_mb: Option<u64>,

    /// Include the expansion zoom of every cluster marker in tile summaries.
    #[serde(default)]
    pub expand_clusters: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: Self::default_id(),
            url: None,
            path: None,
            inline: None,
            options: GeoJsonOptions::default(),
            cache_size_mb: None,
            expand_clusters: false,
        }
    }
}

impl Config {
    fn default_id() -> String {
        "geojson".to_string()
    }

    /// Replaces whatever data the config had with `input`, a URL or a local path.
    pub fn set_input(&mut self, input: String) {
        self.url = Some(input);
        self.path = None;
        self.inline = None;
    }

    /// Validates the options and returns the configured data, if any.
    pub fn finalize(&self) -> GeotilerResult<Option<Input<'_>>> {
        self.options.validate()?;
        let mut inputs = Vec::new();
        if let Some(url) = &self.url {
            inputs.push(("url", Input::Url(url)));
        }
        if let Some(path) = &self.path {
            let path = path
                .to_str()
                .ok_or_else(|| GeotilerError::InvalidPath(path.clone()))?;
            inputs.push(("path", Input::Url(path)));
        }
        if let Some(inline) = &self.inline {
            inputs.push(("inline", Input::Inline(inline)));
        }
        if inputs.len() > 1 {
            let names: Vec<_> = inputs.iter().map(|(name, _)| *name).collect();
            return Err(ConfigFileError::MultipleInputs(names.join(", ")).into());
        }
        Ok(inputs.pop().map(|(_, input)| input))
    }

    fn cache(&self) -> Option<TileCache> {
        let size_mb = self.cache_size_mb.unwrap_or(DEFAULT_CACHE_SIZE_MB);
        (size_mb > 0).then(|| TileCache::new(size_mb * 1024 * 1024, None))
    }

    /// Creates the source and loads its data, waiting until it is indexed.
    pub async fn resolve(&self) -> GeotilerResult<GeoJsonSource> {
        let input = self.finalize()?.ok_or(GeotilerError::NoInput)?;
        let source = GeoJsonSource::with_fetcher(
            self.id.clone(),
            self.options.clone(),
            std::sync::Arc::new(DefaultFetcher::new()),
            self.cache(),
        )?;
        let mut events = source.subscribe();

        let generation = match input {
            Input::Url(url) => {
                info!("Loading {url}");
                source.set_url(url)
            }
            Input::Inline(document) => source.set_geojson_str(&document.to_string())?,
        };
        source.settled().await;

        if source.installed_generation() == generation {
            debug!("Source {} is ready", self.id);
            return Ok(source);
        }
        while let Ok(event) = events.try_recv() {
            if let SourceEvent::Failed(e) = event {
                if e.generation() == generation {
                    return Err(GeotilerError::LoadFailed(e));
                }
            }
        }
        Err(GeotilerError::NoInput)
    }

    pub fn save_to_file(&self, file_name: &Path) -> ConfigFileResult<()> {
        let yaml = serde_yaml::to_string(&self).map_err(ConfigFileError::ConfigSerializeError)?;
        if file_name.as_os_str() == OsStr::new("-") {
            info!("Current configuration:");
            println!("\n\n{yaml}\n");
            Ok(())
        } else {
            info!(
                "Saving config to {}, use --config to load it",
                file_name.display()
            );
            File::create(file_name)
                .map_err(|e| ConfigFileError::ConfigWriteError(e, file_name.to_path_buf()))?
                .write_all(yaml.as_bytes())
                .map_err(|e| ConfigFileError::ConfigWriteError(e, file_name.to_path_buf()))?;
            Ok(())
        }
    }
}

/// Reads a YAML config file, substituting `${VAR}` environment variables.
pub fn read_config(file_name: &Path) -> ConfigFileResult<Config> {
    let mut file =
        File::open(file_name).map_err(|e| ConfigFileError::ConfigLoadError(e, file_name.into()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| ConfigFileError::ConfigLoadError(e, file_name.into()))?;
    parse_config(&contents, file_name)
}

pub fn parse_config(contents: &str, file_name: &Path) -> ConfigFileResult<Config> {
    let contents = subst::substitute(contents, &subst::Env)
        .map_err(|e| ConfigFileError::ConfigSubstitutionError(e, file_name.into()))?;
    serde_yaml::from_str(&contents)
        .map_err(|e| ConfigFileError::ConfigParseError(e, file_name.into()))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use insta::assert_yaml_snapshot;

    use super::*;

    fn parse(yaml: &str) -> Config {
        parse_config(yaml, Path::new("config.yaml")).unwrap()
    }

    #[test]
    fn parses_minimal_config() {
        let config = parse("path: data/points.geojson");
        assert_eq!(config.id, "geojson");
        assert_eq!(config.options, GeoJsonOptions::default());
        assert_eq!(
            config.finalize().unwrap(),
            Some(Input::Url("data/points.geojson"))
        );
    }

    #[test]
    fn parses_full_config() {
        let config = parse(indoc! {"
            id: stations
            url: ${GEOTILER_TEST_UNSET_URL:https://example.org/stations.geojson}
            options:
              cluster: true
              cluster-radius: 80
              cluster-max-zoom: 12
            cache_size_mb: 0
            expand_clusters: true
        "});
        assert_yaml_snapshot!(config, @r"
        id: stations
        url: https://example.org/stations.geojson
        options:
          maxzoom: 18
          buffer: 128
          tolerance: 0.375
          cluster: true
          cluster-radius: 80
          cluster-max-zoom: 12
        cache_size_mb: 0
        expand_clusters: true
        ");
        assert!(config.cache().is_none());
    }

    #[test]
    fn parses_inline_document() {
        let config = parse(indoc! {"
            inline:
              type: Point
              coordinates: [1, 2]
        "});
        let Some(Input::Inline(document)) = config.finalize().unwrap() else {
            panic!("expected inline data");
        };
        assert_eq!(document["type"], "Point");
    }

    #[test]
    fn rejects_multiple_inputs() {
        let config = parse(indoc! {"
            url: https://example.org/a.geojson
            path: a.geojson
        "});
        assert!(matches!(
            config.finalize(),
            Err(GeotilerError::ConfigFileError(ConfigFileError::MultipleInputs(names))) if names == "url, path"
        ));
    }

    #[test]
    fn rejects_invalid_options() {
        let config = parse("options: { maxzoom: 40 }");
        assert!(matches!(
            config.finalize(),
            Err(GeotilerError::GeoJsonError(_))
        ));
    }

    #[test]
    fn saves_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.yaml");
        let mut config = Config {
            id: "points".to_string(),
            ..Config::default()
        };
        config.set_input("points.geojson".to_string());
        config.save_to_file(&file).unwrap();
        assert_eq!(read_config(&file).unwrap(), config);
    }

    #[tokio::test]
    async fn resolves_inline_source() {
        let config = parse(indoc! {r#"
            id: inline
            inline: {"type": "Point", "coordinates": [10, 10]}
        "#});
        let source = config.resolve().await.unwrap();
        assert_eq!(source.id(), "inline");
        assert_eq!(source.installed_generation(), 1);
    }

    #[tokio::test]
    async fn reports_load_failures() {
        let config = parse("url: bad://url");
        assert!(matches!(
            config.resolve().await,
            Err(GeotilerError::LoadFailed(_))
        ));
    }
}
