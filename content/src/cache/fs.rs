//! Content-addressed layer cache on the local filesystem.
//!
//! Each layer's compressed blob is stored once under
//! `cache_dir/blobs/sha256/<hex>`, with its metadata alongside as
//! `<hex>.meta.json`. Blobs are written to a temp file, verified against
//! their digest and then renamed into place, so a reader never sees a
//! partial blob.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use hauler_core::error::{HaulerError, Result};
use serde::{Deserialize, Serialize};

use super::Cache;
use crate::consts;
use crate::digest::{Digest, Digester};
use crate::layer::{Layer, Opener, ReadStream};
use crate::manifest::Descriptor;

/// Metadata for a cached layer entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    pub digest: Digest,
    pub diff_id: Digest,
    pub media_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// When this layer was cached (Unix timestamp)
    pub cached_at: i64,
    /// Last time this layer was read from the cache (Unix timestamp)
    pub last_accessed: i64,
}

pub struct FsCache {
    blob_dir: PathBuf,
}

impl FsCache {
    /// Open (creating if needed) a cache rooted at `cache_dir`.
    pub fn new(cache_dir: &Path) -> Result<Self> {
        let blob_dir = cache_dir.join("blobs").join("sha256");
        std::fs::create_dir_all(&blob_dir).map_err(|e| {
            HaulerError::Cache(format!(
                "Failed to create layer cache directory {}: {}",
                blob_dir.display(),
                e
            ))
        })?;

        Ok(Self { blob_dir })
    }

    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blob_dir.join(digest.hex())
    }

    fn meta_path(&self, digest: &Digest) -> PathBuf {
        self.blob_dir.join(format!("{}.meta.json", digest.hex()))
    }

    /// Remove a cached layer by digest.
    pub fn invalidate(&self, digest: &Digest) -> Result<()> {
        for path in [self.blob_path(digest), self.meta_path(digest)] {
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| {
                    HaulerError::Cache(format!("Failed to remove {}: {}", path.display(), e))
                })?;
            }
        }
        Ok(())
    }

    /// Metadata of every cached layer.
    pub fn entries(&self) -> Result<Vec<BlobMeta>> {
        let read_dir = std::fs::read_dir(&self.blob_dir).map_err(|e| {
            HaulerError::Cache(format!(
                "Failed to read cache directory {}: {}",
                self.blob_dir.display(),
                e
            ))
        })?;

        let mut entries = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.to_string_lossy().ends_with(".meta.json") {
                continue;
            }
            if let Ok(content) = std::fs::read_to_string(&path) {
                if let Ok(meta) = serde_json::from_str::<BlobMeta>(&content) {
                    entries.push(meta);
                }
            }
        }
        entries.sort_by(|a, b| a.digest.cmp(&b.digest));
        Ok(entries)
    }

    fn layer_for(&self, meta: BlobMeta) -> Layer {
        let blob = self.blob_path(&meta.digest);
        let gzipped = consts::is_gzip_media_type(&meta.media_type) && meta.diff_id != meta.digest;

        let compressed: Opener = Arc::new(move || -> io::Result<ReadStream> {
            Ok(Box::new(File::open(&blob)?))
        });
        let uncompressed: Opener = if gzipped {
            let open = compressed.clone();
            Arc::new(move || -> io::Result<ReadStream> { Ok(Box::new(GzDecoder::new(open()?))) })
        } else {
            compressed.clone()
        };

        let descriptor = Descriptor::new(meta.media_type, meta.digest, meta.size)
            .with_annotations(meta.annotations);
        Layer::with_openers(descriptor, meta.diff_id, compressed, uncompressed)
    }

    fn write_blob(&self, layer: &Layer) -> Result<u64> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.blob_dir)
            .map_err(|e| HaulerError::io("create cache temp file", e))?;

        let mut reader = layer.compressed()?;
        let mut digester = Digester::new();
        let mut size = 0u64;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| HaulerError::io(format!("read layer {}", layer.digest()), e))?;
            if n == 0 {
                break;
            }
            digester.update(&buf[..n]);
            tmp.write_all(&buf[..n])
                .map_err(|e| HaulerError::io("write cache temp file", e))?;
            size += n as u64;
        }

        let actual = digester.finish();
        if &actual != layer.digest() {
            return Err(HaulerError::DigestMismatch {
                expected: layer.digest().to_string(),
                actual: actual.to_string(),
            });
        }

        tmp.persist(self.blob_path(layer.digest())).map_err(|e| {
            HaulerError::Cache(format!(
                "Failed to store blob {}: {}",
                layer.digest(),
                e.error
            ))
        })?;
        Ok(size)
    }
}

impl Cache for FsCache {
    fn get(&self, digest: &Digest) -> Result<Option<Layer>> {
        let blob = self.blob_path(digest);
        let meta_path = self.meta_path(digest);
        if !blob.is_file() || !meta_path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&meta_path)
            .map_err(|e| HaulerError::io(format!("read {}", meta_path.display()), e))?;
        let mut meta: BlobMeta = match serde_json::from_str(&content) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(
                    digest = %digest,
                    error = %e,
                    "Ignoring corrupt layer cache metadata"
                );
                return Ok(None);
            }
        };

        // Update last_accessed timestamp
        meta.last_accessed = chrono::Utc::now().timestamp();
        let _ = std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?);

        Ok(Some(self.layer_for(meta)))
    }

    fn put(&self, layer: &Layer) -> Result<Layer> {
        let size = self.write_blob(layer)?;

        let now = chrono::Utc::now().timestamp();
        let meta = BlobMeta {
            digest: layer.digest().clone(),
            diff_id: layer.diff_id().clone(),
            media_type: layer.media_type().to_string(),
            size,
            annotations: layer.annotations(),
            cached_at: now,
            last_accessed: now,
        };
        let meta_path = self.meta_path(&meta.digest);
        std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?).map_err(|e| {
            HaulerError::Cache(format!(
                "Failed to write layer metadata {}: {}",
                meta_path.display(),
                e
            ))
        })?;

        tracing::debug!(
            digest = %meta.digest,
            size,
            path = %self.blob_path(&meta.digest).display(),
            "Cached layer"
        );

        Ok(self.layer_for(meta))
    }
}
