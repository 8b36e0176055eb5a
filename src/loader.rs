//! Entry point tying transport, extensions and decoding together.

use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::decode::{DecoderFactory, DecoderPool, PackedMeshFactory};
use crate::gltf::Gltf;
use crate::load::{CancellationToken, FileFetcher, Fetcher, LoadContext, LoadOutcome};
use crate::registry::ExtensionRegistry;
use crate::util::Result;

/// Opens and loads assets.
///
/// ```ignore
/// let loader = GltfLoader::new(LoaderConfig::from_env()?);
/// match loader.open("scene.glb", &CancellationToken::new()).await? {
///     LoadOutcome::Loaded(gltf) => println!("{} nodes", gltf.nodes.len()),
///     LoadOutcome::Cancelled => {}
/// }
/// ```
pub struct GltfLoader {
    config: LoaderConfig,
    registry: Arc<ExtensionRegistry>,
    fetcher: Arc<dyn Fetcher>,
    pool: Arc<DecoderPool>,
}

impl GltfLoader {
    /// File-system transport, built-in extensions and the packed-mesh decoder.
    pub fn new(config: LoaderConfig) -> Self {
        let fetcher: Arc<dyn Fetcher> = match &config.base_dir {
            Some(dir) => Arc::new(FileFetcher::with_base_dir(dir)),
            None => Arc::new(FileFetcher::new()),
        };
        let pool = Arc::new(DecoderPool::new(
            config.pool.clone(),
            Arc::new(PackedMeshFactory),
        ));
        Self {
            config,
            registry: Arc::new(ExtensionRegistry::with_builtin()),
            fetcher,
            pool,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ExtensionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the mesh decoder; the pool keeps the configured size.
    pub fn with_decoder_factory(mut self, factory: Arc<dyn DecoderFactory>) -> Self {
        self.pool = Arc::new(DecoderPool::new(self.config.pool.clone(), factory));
        self
    }

    #[inline]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    #[inline]
    pub fn pool(&self) -> &Arc<DecoderPool> {
        &self.pool
    }

    /// A load context sharing this loader's transport and pool.
    pub fn context(&self, token: CancellationToken) -> LoadContext {
        LoadContext::new(Arc::clone(&self.fetcher), token).with_pool(Arc::clone(&self.pool))
    }

    /// Build the graph from bytes already in memory without loading it.
    pub fn parse(&self, data: &[u8], uri: &str) -> Result<Gltf> {
        Gltf::from_slice(data, uri, &self.registry)
    }

    /// Fetch, build and fully load the asset at `uri`.
    pub async fn open(&self, uri: &str, token: &CancellationToken) -> Result<LoadOutcome<Gltf>> {
        let cx = self.context(token.clone());
        let data = match LoadOutcome::from_result(cx.fetch(uri).await)? {
            LoadOutcome::Loaded(data) => data,
            LoadOutcome::Cancelled => return Ok(LoadOutcome::Cancelled),
        };
        let gltf = self.parse(&data, uri)?;
        Ok(match gltf.load(&cx).await? {
            LoadOutcome::Loaded(()) => {
                tracing::debug!(uri, "loaded");
                LoadOutcome::Loaded(gltf)
            }
            LoadOutcome::Cancelled => {
                tracing::debug!(uri, "load cancelled");
                LoadOutcome::Cancelled
            }
        })
    }
}

impl Default for GltfLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl std::fmt::Debug for GltfLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GltfLoader")
            .field("config", &self.config)
            .field("extensions", &self.registry.names())
            .field("pool", &self.pool)
            .finish()
    }
}
