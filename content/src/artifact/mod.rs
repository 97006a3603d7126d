//! OCI artifacts.
//!
//! Every kind exposes the same surface: a manifest media type, the manifest
//! itself, the raw config blob and the ordered layers. [`Artifact`] is the
//! closed set of kinds and dispatches to them.

pub mod chart;
pub mod file;
pub mod image;
pub mod memory;

pub use chart::ChartArtifact;
pub use file::FileArtifact;
pub use image::ImageArtifact;
pub use memory::MemoryArtifact;

use hauler_core::error::Result;

use crate::cache::CachedArtifact;
use crate::layer::Layer;
use crate::manifest::Manifest;

#[derive(Debug, Clone)]
pub enum Artifact {
    File(FileArtifact),
    Memory(MemoryArtifact),
    Image(ImageArtifact),
    Chart(ChartArtifact),
    /// Any other kind whose layer bytes go through a cache.
    Cached(CachedArtifact),
}

impl Artifact {
    pub fn media_type(&self) -> Result<String> {
        match self {
            Artifact::File(a) => Ok(a.media_type().to_string()),
            Artifact::Memory(a) => Ok(a.media_type().to_string()),
            Artifact::Image(a) => a.media_type(),
            Artifact::Chart(a) => Ok(a.media_type().to_string()),
            Artifact::Cached(a) => a.media_type(),
        }
    }

    pub fn manifest(&self) -> Result<Manifest> {
        match self {
            Artifact::File(a) => a.manifest(),
            Artifact::Memory(a) => Ok(a.manifest()),
            Artifact::Image(a) => a.manifest(),
            Artifact::Chart(a) => a.manifest(),
            Artifact::Cached(a) => a.manifest(),
        }
    }

    pub fn raw_config(&self) -> Result<Vec<u8>> {
        match self {
            Artifact::File(a) => a.raw_config(),
            Artifact::Memory(a) => Ok(a.raw_config()),
            Artifact::Image(a) => a.raw_config(),
            Artifact::Chart(a) => a.raw_config(),
            Artifact::Cached(a) => a.raw_config(),
        }
    }

    /// Layers in manifest order.
    pub fn layers(&self) -> Result<Vec<Layer>> {
        match self {
            Artifact::File(a) => a.layers(),
            Artifact::Memory(a) => Ok(a.layers()),
            Artifact::Image(a) => a.layers(),
            Artifact::Chart(a) => a.layers(),
            Artifact::Cached(a) => a.layers(),
        }
    }

    /// Serialized manifest, as pushed.
    pub fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.manifest()?.to_bytes()?)
    }
}

impl From<FileArtifact> for Artifact {
    fn from(a: FileArtifact) -> Self {
        Artifact::File(a)
    }
}

impl From<MemoryArtifact> for Artifact {
    fn from(a: MemoryArtifact) -> Self {
        Artifact::Memory(a)
    }
}

impl From<ImageArtifact> for Artifact {
    fn from(a: ImageArtifact) -> Self {
        Artifact::Image(a)
    }
}

impl From<ChartArtifact> for Artifact {
    fn from(a: ChartArtifact) -> Self {
        Artifact::Chart(a)
    }
}

impl From<CachedArtifact> for Artifact {
    fn from(a: CachedArtifact) -> Self {
        Artifact::Cached(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts;
    use crate::digest::Digest;

    #[test]
    fn test_dispatch_memory() {
        let artifact: Artifact = MemoryArtifact::new(b"data".to_vec(), consts::UNKNOWN_LAYER)
            .unwrap()
            .into();

        assert_eq!(artifact.media_type().unwrap(), consts::OCI_MANIFEST_SCHEMA1);
        assert_eq!(artifact.raw_config().unwrap(), b"{}");
        assert_eq!(artifact.layers().unwrap()[0].digest(), &Digest::sha256(b"data"));

        let manifest = artifact.manifest().unwrap();
        assert_eq!(artifact.raw_manifest().unwrap(), manifest.to_bytes().unwrap());
    }

    #[test]
    fn test_layers_match_manifest_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        let chart = chart::tests::write_chart(tmp.path(), "app", "1.0.0");
        let prov = tmp.path().join("app-1.0.0.tgz.prov");
        std::fs::write(&prov, "signature").unwrap();

        let artifact: Artifact = ChartArtifact::new(chart.to_str().unwrap())
            .with_provenance(prov.to_str().unwrap())
            .into();

        let manifest = artifact.manifest().unwrap();
        let layers = artifact.layers().unwrap();
        let descriptors: Vec<_> = layers.iter().map(Layer::descriptor).collect();
        assert_eq!(manifest.layers, descriptors);
    }
}
