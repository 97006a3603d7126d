//! Container images proxied from a registry.

use std::io;
use std::sync::Arc;

use flate2::read::GzDecoder;
use hauler_core::error::Result;
use oci_distribution::Reference;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::consts;
use crate::digest::Digest;
use crate::layer::{Layer, Opener, ReadStream};
use crate::manifest::Manifest;
use crate::registry::{self, RegistryClient, RemoteImage};

/// The part of an image config needed to recover diff-ids.
#[derive(Debug, Default, Deserialize)]
struct ImageConfig {
    #[serde(default)]
    rootfs: Option<RootFs>,
}

#[derive(Debug, Default, Deserialize)]
struct RootFs {
    #[serde(default)]
    diff_ids: Vec<String>,
}

/// A remote image. Manifest and config are fetched once, on first use;
/// layer blobs are pulled every time a layer stream is opened.
#[derive(Clone)]
pub struct ImageArtifact {
    name: String,
    reference: Reference,
    registry: Arc<RegistryClient>,
    remote: Arc<Mutex<Option<Arc<RemoteImage>>>>,
}

impl std::fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("reference", &self.reference.whole())
            .finish()
    }
}

impl ImageArtifact {
    pub fn new(name: &str, registry: Arc<RegistryClient>) -> Result<Self> {
        let reference = registry::parse_reference(name)?;
        Ok(Self {
            name: name.trim().to_string(),
            reference,
            registry,
            remote: Arc::new(Mutex::new(None)),
        })
    }

    /// Name as given by the caller.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Whether the reference points at an image index.
    pub fn is_multi_arch(&self) -> Result<bool> {
        self.registry.is_multi_arch(&self.name)
    }

    pub fn media_type(&self) -> Result<String> {
        Ok(self
            .remote()?
            .manifest
            .media_type
            .clone()
            .unwrap_or_else(|| consts::OCI_MANIFEST_SCHEMA1.to_string()))
    }

    pub fn manifest(&self) -> Result<Manifest> {
        registry::to_manifest(&self.remote()?.manifest)
    }

    pub fn raw_config(&self) -> Result<Vec<u8>> {
        Ok(self.remote()?.config.clone().into_bytes())
    }

    pub fn layers(&self) -> Result<Vec<Layer>> {
        let remote = self.remote()?;
        let config: ImageConfig = serde_json::from_str(&remote.config)?;
        let diff_ids = config.rootfs.map(|r| r.diff_ids).unwrap_or_default();

        remote
            .manifest
            .layers
            .iter()
            .enumerate()
            .map(|(i, desc)| -> Result<Layer> {
                let descriptor = registry::to_descriptor(desc)?;
                let diff_id = match diff_ids.get(i) {
                    Some(id) => id.parse::<Digest>()?,
                    None => descriptor.digest.clone(),
                };

                let registry = self.registry.clone();
                let reference = self.reference.clone();
                let blob = desc.clone();
                let compressed: Opener = Arc::new(move || -> io::Result<ReadStream> {
                    let file = registry
                        .pull_blob(&reference, &blob)
                        .map_err(io::Error::other)?;
                    Ok(Box::new(file) as ReadStream)
                });

                let uncompressed: Opener = if consts::is_gzip_media_type(&descriptor.media_type) {
                    let open = compressed.clone();
                    Arc::new(move || -> io::Result<ReadStream> {
                        Ok(Box::new(GzDecoder::new(open()?)))
                    })
                } else {
                    compressed.clone()
                };

                Ok(Layer::with_openers(descriptor, diff_id, compressed, uncompressed))
            })
            .collect()
    }

    fn remote(&self) -> Result<Arc<RemoteImage>> {
        let mut remote = self.remote.lock();
        if let Some(image) = remote.as_ref() {
            return Ok(image.clone());
        }

        let image = Arc::new(self.registry.fetch(&self.reference)?);
        if image.manifest.layers.is_empty() {
            tracing::warn!(reference = %self.reference, "Image has no layers");
        }
        *remote = Some(image.clone());
        Ok(image)
    }
}
