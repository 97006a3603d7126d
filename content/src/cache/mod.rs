//! Layer caching.
//!
//! [`oci_cache`] wraps an artifact so that each of its layers consults a
//! [`Cache`] the first time its bytes are read. Descriptors, sizes and
//! diff-ids still come from the wrapped layer, so wrapping never changes the
//! manifest.

pub mod fs;

pub use fs::FsCache;

use std::fmt;
use std::io;
use std::sync::Arc;

use hauler_core::error::Result;
use parking_lot::Mutex;

use crate::artifact::Artifact;
use crate::digest::Digest;
use crate::layer::{Layer, Opener};
use crate::manifest::Manifest;

/// Content-addressed layer store. Implementations handle their own locking.
pub trait Cache: Send + Sync {
    /// Cached layer for `digest`, if any.
    fn get(&self, digest: &Digest) -> Result<Option<Layer>>;

    /// Store `layer` and return a layer reading from the cache.
    fn put(&self, layer: &Layer) -> Result<Layer>;
}

/// Wrap `artifact` so its layer bytes are served from `cache`.
pub fn oci_cache(artifact: Artifact, cache: Arc<dyn Cache>) -> Artifact {
    Artifact::Cached(CachedArtifact {
        inner: Arc::new(artifact),
        cache,
    })
}

#[derive(Clone)]
pub struct CachedArtifact {
    inner: Arc<Artifact>,
    cache: Arc<dyn Cache>,
}

impl fmt::Debug for CachedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedArtifact")
            .field("inner", &self.inner)
            .finish()
    }
}

impl CachedArtifact {
    pub fn inner(&self) -> &Artifact {
        &self.inner
    }

    pub fn media_type(&self) -> Result<String> {
        self.inner.media_type()
    }

    pub fn manifest(&self) -> Result<Manifest> {
        self.inner.manifest()
    }

    pub fn raw_config(&self) -> Result<Vec<u8>> {
        self.inner.raw_config()
    }

    pub fn layers(&self) -> Result<Vec<Layer>> {
        Ok(self
            .inner
            .layers()?
            .into_iter()
            .map(|layer| lazy_layer(layer, self.cache.clone()))
            .collect())
    }
}

/// Resolves to the cached copy of a layer on first use.
struct LazyLayer {
    inner: Layer,
    cache: Arc<dyn Cache>,
    resolved: Mutex<Option<Layer>>,
}

impl LazyLayer {
    fn resolve(&self) -> Result<Layer> {
        let mut resolved = self.resolved.lock();
        if let Some(layer) = resolved.as_ref() {
            return Ok(layer.clone());
        }

        let layer = match self.cache.get(self.inner.digest())? {
            Some(hit) => {
                tracing::debug!(digest = %self.inner.digest(), "Layer cache hit");
                hit
            }
            None => {
                tracing::debug!(digest = %self.inner.digest(), "Layer cache miss");
                self.cache.put(&self.inner)?
            }
        };
        *resolved = Some(layer.clone());
        Ok(layer)
    }
}

fn lazy_layer(inner: Layer, cache: Arc<dyn Cache>) -> Layer {
    let descriptor = inner.descriptor();
    let diff_id = inner.diff_id().clone();
    let lazy = Arc::new(LazyLayer {
        inner,
        cache,
        resolved: Mutex::new(None),
    });

    let compressed: Opener = {
        let lazy = lazy.clone();
        Arc::new(move || {
            let layer = lazy.resolve().map_err(io::Error::other)?;
            (layer.compressed_opener())()
        })
    };
    let uncompressed: Opener = Arc::new(move || {
        let layer = lazy.resolve().map_err(io::Error::other)?;
        (layer.uncompressed_opener())()
    });

    Layer::with_openers(descriptor, diff_id, compressed, uncompressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifact;
    use crate::consts;
    use crate::layer::ReadStream;
    use std::collections::HashMap;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MapCache {
        layers: Mutex<HashMap<Digest, Layer>>,
        gets: AtomicUsize,
        puts: AtomicUsize,
    }

    impl Cache for MapCache {
        fn get(&self, digest: &Digest) -> Result<Option<Layer>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(self.layers.lock().get(digest).cloned())
        }

        fn put(&self, layer: &Layer) -> Result<Layer> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.layers.lock().insert(layer.digest().clone(), layer.clone());
            Ok(layer.clone())
        }
    }

    fn read_all(layer: &Layer) -> Vec<u8> {
        let mut out = Vec::new();
        layer.compressed().unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_cache_is_lazy() {
        let cache = Arc::new(MapCache::default());
        let artifact = oci_cache(
            MemoryArtifact::new(b"payload".to_vec(), consts::UNKNOWN_LAYER)
                .unwrap()
                .into(),
            cache.clone(),
        );

        let layers = artifact.layers().unwrap();
        assert_eq!(layers[0].digest(), &Digest::sha256(b"payload"));
        assert_eq!(layers[0].size(), 7);
        assert_eq!(cache.gets.load(Ordering::SeqCst), 0);

        assert_eq!(read_all(&layers[0]), b"payload");
        assert_eq!(cache.gets.load(Ordering::SeqCst), 1);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 1);

        // Resolution happens once per layer.
        assert_eq!(read_all(&layers[0]), b"payload");
        assert_eq!(cache.gets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cache_hit_skips_put() {
        let cache = Arc::new(MapCache::default());
        let memory: Artifact = MemoryArtifact::new(b"payload".to_vec(), consts::UNKNOWN_LAYER)
            .unwrap()
            .into();
        cache.put(&memory.layers().unwrap()[0]).unwrap();

        let artifact = oci_cache(memory, cache.clone());
        let layers = artifact.layers().unwrap();
        assert_eq!(read_all(&layers[0]), b"payload");
        assert_eq!(cache.puts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cached_manifest_unchanged() {
        let memory: Artifact = MemoryArtifact::new(b"payload".to_vec(), consts::UNKNOWN_LAYER)
            .unwrap()
            .into();
        let expected = memory.manifest().unwrap();

        let artifact = oci_cache(memory, Arc::new(MapCache::default()));
        assert_eq!(artifact.manifest().unwrap(), expected);
        assert_eq!(artifact.raw_config().unwrap(), b"{}");
    }

    #[test]
    fn test_diff_id_is_uncompressed_digest() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cache: Arc<dyn Cache> = Arc::new(FsCache::new(tmp.path()).unwrap());

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut gz, b"plain tar bytes").unwrap();
        let compressed = gz.finish().unwrap();

        let data: Arc<[u8]> = compressed.clone().into();
        let raw = data.clone();
        let inner = Layer::with_openers(
            crate::manifest::Descriptor::new(
                consts::OCI_LAYER,
                Digest::sha256(&compressed),
                compressed.len() as u64,
            ),
            Digest::sha256(b"plain tar bytes"),
            Arc::new(move || -> io::Result<ReadStream> {
                Ok(Box::new(io::Cursor::new(raw.clone())))
            }),
            Arc::new(move || -> io::Result<ReadStream> {
                Ok(Box::new(flate2::read::GzDecoder::new(io::Cursor::new(data.clone()))))
            }),
        );

        let layer = lazy_layer(inner, cache);
        assert_eq!(layer.diff_id(), &Digest::sha256(b"plain tar bytes"));
        assert_ne!(layer.diff_id(), layer.digest());

        let mut plain = Vec::new();
        layer.uncompressed().unwrap().read_to_end(&mut plain).unwrap();
        assert_eq!(plain, b"plain tar bytes");
    }
}
