//! A `GeoJSON` source whose data can be replaced at runtime.

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use arc_swap::{ArcSwap, ArcSwapOption};
use geojson::Feature;
use geotiler_tile_utils::TileCoord;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::document::Bounds;
use super::options::TILE_EXTENT;
use super::response::{ClusterExpansion, TileContents};
use super::{BuildError, GeoJsonDocument, GeoJsonOptions, GeoJsonResult, SourceIndex};
use crate::fetch::{DefaultFetcher, Fetcher};
use crate::tiles::{OptTileCache, Tile};

/// How many events a slow subscriber may fall behind before it starts missing them.
const EVENT_CAPACITY: usize = 64;

/// A failure while loading or indexing a document. None of them are fatal:
/// the previously installed index keeps serving tiles.
#[non_exhaustive]
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum SourceError {
    /// The URL could not be resolved.
    #[error("Generation {generation}: unable to fetch {url}: {message}")]
    #[allow(missing_docs)]
    Fetch {
        generation: u64,
        url: String,
        message: String,
    },

    /// The payload is not a usable `GeoJSON` document.
    #[error("Generation {generation}: unable to parse GeoJSON: {message}")]
    #[allow(missing_docs)]
    Parse { generation: u64, message: String },

    /// The index builder rejected the document.
    #[error("Generation {generation}: unable to build index: {message}")]
    #[allow(missing_docs)]
    Build { generation: u64, message: String },
}

impl SourceError {
    /// Generation of the update that failed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::Fetch { generation, .. }
            | Self::Parse { generation, .. }
            | Self::Build { generation, .. } => *generation,
        }
    }
}

/// Progress notifications of a [`GeoJsonSource`], see [`GeoJsonSource::subscribe`].
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    /// A new document became current and its index build was scheduled.
    #[allow(missing_docs)]
    DocumentLoaded { generation: u64, features: usize },
    /// The index built for `generation` now answers tile queries.
    #[allow(missing_docs)]
    IndexInstalled { generation: u64 },
    /// A newer update arrived before this one finished, its result was dropped.
    #[allow(missing_docs)]
    BuildDiscarded { generation: u64 },
    /// An update failed.
    Failed(SourceError),
}

/// The index answering tile queries, with what it was built from.
#[derive(Debug, Default)]
struct Installed {
    generation: u64,
    index: SourceIndex,
    bounds: Option<Bounds>,
}

struct Shared {
    id: String,
    options: GeoJsonOptions,
    fetcher: Arc<dyn Fetcher>,
    runtime: Handle,
    cache: OptTileCache,
    url: RwLock<Option<String>>,
    document: ArcSwapOption<GeoJsonDocument>,
    installed: ArcSwap<Installed>,
    /// Latest requested update.
    generation: AtomicU64,
    /// Serializes generation changes with the document and index swaps.
    install_lock: Mutex<()>,
    events: broadcast::Sender<SourceEvent>,
    /// Highest generation whose update has finished, one way or another.
    finished: watch::Sender<u64>,
}

/// A tile source backed by a `GeoJSON` document that can be replaced at any time.
///
/// Every update ([`set_url`](Self::set_url) or [`set_geojson`](Self::set_geojson)) gets a new
/// generation and builds its index on the blocking thread pool of the Tokio runtime the source
/// was created in. Tile queries never wait for a build: they are answered from the index that
/// was installed last, and only the build of the latest generation is ever installed.
/// Dropping the source drops the result of any build still in flight.
pub struct GeoJsonSource {
    shared: Arc<Shared>,
}

impl Debug for GeoJsonSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoJsonSource")
            .field("id", &self.shared.id)
            .field("options", &self.shared.options)
            .field("generation", &self.generation())
            .field("installed_generation", &self.installed_generation())
            .finish_non_exhaustive()
    }
}

impl GeoJsonSource {
    /// Creates an empty source that reads URLs with the [`DefaultFetcher`] and caches nothing.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(id: impl Into<String>, options: GeoJsonOptions) -> GeoJsonResult<Self> {
        Self::with_fetcher(id, options, Arc::new(DefaultFetcher::new()), None)
    }

    /// Creates an empty source with a custom fetcher and an optional cache of encoded tiles.
    ///
    /// Must be called within a Tokio runtime.
    pub fn with_fetcher(
        id: impl Into<String>,
        options: GeoJsonOptions,
        fetcher: Arc<dyn Fetcher>,
        cache: OptTileCache,
    ) -> GeoJsonResult<Self> {
        options.validate()?;
        let runtime = Handle::try_current()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (finished, _) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(Shared {
                id: id.into(),
                options,
                fetcher,
                runtime,
                cache,
                url: RwLock::new(None),
                document: ArcSwapOption::empty(),
                installed: ArcSwap::default(),
                generation: AtomicU64::new(0),
                install_lock: Mutex::new(()),
                events,
                finished,
            }),
        })
    }

    /// Name of the source, also used as the MVT layer name.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Tiling options the source was created with.
    #[must_use]
    pub fn options(&self) -> &GeoJsonOptions {
        &self.shared.options
    }

    /// Replaces the data with the document at `url`, fetched and indexed in the background.
    ///
    /// The index built from the previous data keeps serving tiles until the new one is ready,
    /// and stays if fetching, parsing or indexing fails.
    /// Returns the generation of this update.
    pub fn set_url(&self, url: impl Into<String>) -> u64 {
        let url = url.into();
        let shared = &self.shared;
        let generation = {
            let _guard = shared.lock();
            *shared.url.write().unwrap_or_else(PoisonError::into_inner) = Some(url.clone());
            shared.document.store(None);
            shared.next_generation()
        };
        info!(source_id = %shared.id, generation, url = %url, "Fetching GeoJSON");

        let weak = Arc::downgrade(shared);
        let fetcher = shared.fetcher.clone();
        shared.runtime.spawn(async move {
            let fetched = fetcher.fetch(&url).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match fetched {
                Ok(data) => {
                    let options = shared.options.clone();
                    drop(shared);
                    tokio::task::spawn_blocking(move || {
                        load_fetched(&weak, generation, &data, &options);
                    });
                }
                Err(_) if !shared.is_current(generation) => shared.discard(generation),
                Err(e) => {
                    warn!(source_id = %shared.id, generation, url = %url, "Unable to fetch GeoJSON: {e}");
                    shared.report(SourceError::Fetch {
                        generation,
                        url,
                        message: e.to_string(),
                    });
                    shared.finish(generation);
                }
            }
        });
        generation
    }

    /// Replaces the data with `document` and schedules its index build.
    ///
    /// Returns immediately with the generation of this update.
    pub fn set_geojson(&self, document: GeoJsonDocument) -> u64 {
        let shared = &self.shared;
        let document = Arc::new(document);
        let generation = {
            let _guard = shared.lock();
            *shared.url.write().unwrap_or_else(PoisonError::into_inner) = None;
            let generation = shared.next_generation();
            shared.load_document(generation, document.clone());
            generation
        };
        schedule_build(shared, generation, document);
        generation
    }

    /// Parses `data` and replaces the data with it, see [`set_geojson`](Self::set_geojson).
    ///
    /// A payload that cannot be parsed leaves the source untouched, and is also reported
    /// as a [`SourceError::Parse`] event.
    pub fn set_geojson_str(&self, data: &str) -> GeoJsonResult<u64> {
        match data.parse::<GeoJsonDocument>() {
            Ok(document) => Ok(self.set_geojson(document)),
            Err(e) => {
                let generation = self.generation();
                warn!(source_id = %self.shared.id, generation, "Ignoring invalid GeoJSON: {e}");
                self.shared.report(SourceError::Parse {
                    generation,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// The URL last set with [`set_url`](Self::set_url), or `None` when the data was supplied inline.
    #[must_use]
    pub fn get_url(&self) -> Option<String> {
        self.shared
            .url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recently loaded document, which may not be indexed yet.
    #[must_use]
    pub fn document(&self) -> Option<Arc<GeoJsonDocument>> {
        self.shared.document.load_full()
    }

    /// Generation of the latest update.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Generation of the index currently answering tile queries, `0` while there is none.
    #[must_use]
    pub fn installed_generation(&self) -> u64 {
        self.shared.installed.load().generation
    }

    /// The index currently answering tile queries.
    #[must_use]
    pub fn index(&self) -> SourceIndex {
        self.shared.installed.load().index.clone()
    }

    /// Bounds (`[west, south, east, north]`) of the document the installed index was built from.
    #[must_use]
    pub fn bounds(&self) -> Option<Bounds> {
        self.shared.installed.load().bounds
    }

    /// Receives the progress of all updates made after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.shared.events.subscribe()
    }

    /// Waits until the latest update has finished, whether it was installed or failed.
    ///
    /// Updates made while waiting are waited for as well.
    pub async fn settled(&self) {
        let mut finished = self.shared.finished.subscribe();
        loop {
            let target = self.generation();
            let done = finished.wait_for(|g| *g >= target).await.is_ok();
            if !done || self.generation() == target {
                return;
            }
        }
    }

    /// Tile contents from the installed index, empty while there is none.
    #[must_use]
    pub fn get_tile(&self, xyz: TileCoord) -> TileContents {
        self.shared.installed.load().index.get_tile(xyz)
    }

    /// The tile encoded as a Mapbox Vector Tile with a single layer named after the source.
    pub fn get_mvt_tile(&self, xyz: TileCoord) -> GeoJsonResult<Tile> {
        let installed = self.shared.installed.load_full();
        let encode = || -> GeoJsonResult<Tile> {
            let data = installed.index.get_tile(xyz).to_mvt(&self.shared.id, TILE_EXTENT)?;
            Ok(Tile::new(xyz, installed.generation, data))
        };
        match &self.shared.cache {
            Some(cache) => cache.get_or_insert(installed.generation, xyz, encode),
            None => encode(),
        }
    }

    /// Sub-clusters of the next zoom level, or the original points when the cluster is made of
    /// points only. `None` unless a cluster index is installed and knows `cluster_id`.
    #[must_use]
    pub fn expand_cluster(&self, cluster_id: u64) -> Option<ClusterExpansion> {
        self.shared.installed.load().index.as_clusters()?.expand(cluster_id)
    }

    /// Direct children of a cluster.
    #[must_use]
    pub fn get_children(&self, cluster_id: u64) -> Option<Vec<Feature>> {
        self.shared
            .installed
            .load()
            .index
            .as_clusters()?
            .get_children(cluster_id)
    }

    /// Original points of a cluster, paginated.
    #[must_use]
    pub fn get_leaves(&self, cluster_id: u64, limit: usize, offset: usize) -> Option<Vec<Feature>> {
        self.shared
            .installed
            .load()
            .index
            .as_clusters()?
            .get_leaves(cluster_id, limit, offset)
    }

    /// Zoom level at which a cluster splits into several.
    #[must_use]
    pub fn get_cluster_expansion_zoom(&self, cluster_id: u64) -> Option<u8> {
        self.shared
            .installed
            .load()
            .index
            .as_clusters()?
            .get_cluster_expansion_zoom(cluster_id)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.install_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn report(&self, error: SourceError) {
        // no subscribers is fine
        let _ = self.events.send(SourceEvent::Failed(error));
    }

    fn load_document(&self, generation: u64, document: Arc<GeoJsonDocument>) {
        debug!(
            source_id = %self.id,
            generation,
            "Loaded GeoJSON document with {} features",
            document.len()
        );
        let features = document.len();
        self.document.store(Some(document));
        let _ = self.events.send(SourceEvent::DocumentLoaded {
            generation,
            features,
        });
    }

    fn finish(&self, generation: u64) {
        self.finished.send_if_modified(|finished| {
            if generation > *finished {
                *finished = generation;
                true
            } else {
                false
            }
        });
    }

    fn discard(&self, generation: u64) {
        debug!(source_id = %self.id, generation, "Discarding superseded GeoJSON update");
        let _ = self.events.send(SourceEvent::BuildDiscarded { generation });
        self.finish(generation);
    }

    fn install(&self, generation: u64, built: Result<SourceIndex, BuildError>, bounds: Option<Bounds>) {
        let index = match built {
            Ok(index) => index,
            Err(_) if !self.is_current(generation) => {
                self.discard(generation);
                return;
            }
            Err(e) => {
                warn!(source_id = %self.id, generation, "Unable to index GeoJSON: {e}");
                self.report(SourceError::Build {
                    generation,
                    message: e.to_string(),
                });
                self.finish(generation);
                return;
            }
        };

        {
            let guard = self.lock();
            if !self.is_current(generation) {
                drop(guard);
                self.discard(generation);
                return;
            }
            self.installed.store(Arc::new(Installed {
                generation,
                index,
                bounds,
            }));
            if let Some(cache) = &self.cache {
                cache.invalidate_all();
            }
        }
        info!(source_id = %self.id, generation, "Installed GeoJSON index");
        let _ = self.events.send(SourceEvent::IndexInstalled { generation });
        self.finish(generation);
    }
}

/// Builds the index of `document` on the blocking thread pool.
fn schedule_build(shared: &Arc<Shared>, generation: u64, document: Arc<GeoJsonDocument>) {
    let weak = Arc::downgrade(shared);
    let options = shared.options.clone();
    shared.runtime.spawn_blocking(move || build(&weak, generation, &document, &options));
}

fn build(weak: &Weak<Shared>, generation: u64, document: &GeoJsonDocument, options: &GeoJsonOptions) {
    match weak.upgrade() {
        None => return,
        Some(shared) if !shared.is_current(generation) => {
            shared.discard(generation);
            return;
        }
        Some(_) => {}
    }
    let built = SourceIndex::build(document, options);
    if let Some(shared) = weak.upgrade() {
        shared.install(generation, built, document.bounds());
    }
}

/// Parses a fetched payload and, if its update is still the latest, indexes it.
fn load_fetched(weak: &Weak<Shared>, generation: u64, data: &[u8], options: &GeoJsonOptions) {
    let parsed = GeoJsonDocument::from_slice(data);
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let document = match parsed {
        Ok(document) => Arc::new(document),
        Err(_) if !shared.is_current(generation) => {
            shared.discard(generation);
            return;
        }
        Err(e) => {
            warn!(source_id = %shared.id, generation, "Unable to parse fetched GeoJSON: {e}");
            shared.report(SourceError::Parse {
                generation,
                message: e.to_string(),
            });
            shared.finish(generation);
            return;
        }
    };
    {
        let guard = shared.lock();
        if !shared.is_current(generation) {
            drop(guard);
            shared.discard(generation);
            return;
        }
        shared.load_document(generation, document.clone());
    }
    drop(shared);
    build(weak, generation, &document, options);
}
