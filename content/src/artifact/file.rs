//! File artifacts: one source (local file, directory or URL) as one layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use hauler_core::error::Result;
use parking_lot::Mutex;

use crate::config::Config;
use crate::consts;
use crate::getter::Client;
use crate::layer::Layer;
use crate::manifest::Manifest;

#[derive(Debug, Clone)]
struct Computed {
    manifest: Manifest,
    config: Config,
    layer: Layer,
}

/// A source reference published as a single-layer OCI artifact.
///
/// The layer and config are built on first access and memoized; clones share
/// the memoized result.
#[derive(Clone)]
pub struct FileArtifact {
    reference: String,
    client: Client,
    annotations: BTreeMap<String, String>,
    computed: Arc<Mutex<Option<Computed>>>,
}

impl std::fmt::Debug for FileArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileArtifact")
            .field("reference", &self.reference)
            .field("computed", &self.computed.lock().is_some())
            .finish()
    }
}

impl FileArtifact {
    pub fn new(reference: impl Into<String>) -> Self {
        Self::with_client(reference, Client::default())
    }

    /// Use a preconfigured getter client (name override, cancellation).
    pub fn with_client(reference: impl Into<String>, client: Client) -> Self {
        Self {
            reference: reference.into(),
            client,
            annotations: BTreeMap::new(),
            computed: Arc::new(Mutex::new(None)),
        }
    }

    /// Manifest-level annotations.
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn media_type(&self) -> &'static str {
        consts::OCI_MANIFEST_SCHEMA1
    }

    pub fn manifest(&self) -> Result<Manifest> {
        Ok(self.compute()?.manifest)
    }

    pub fn raw_config(&self) -> Result<Vec<u8>> {
        Ok(self.compute()?.config.raw().to_vec())
    }

    pub fn layers(&self) -> Result<Vec<Layer>> {
        Ok(vec![self.compute()?.layer])
    }

    fn compute(&self) -> Result<Computed> {
        let mut computed = self.computed.lock();
        if let Some(done) = computed.as_ref() {
            return Ok(done.clone());
        }

        let layer = self.client.layer_from(&self.reference)?;
        let config = self.client.config(&self.reference)?;
        let manifest = Manifest::new(config.descriptor(), vec![layer.descriptor()])
            .with_annotations(self.annotations.clone());

        tracing::info!(
            reference = %self.reference,
            layer = %layer.digest(),
            "Computed file artifact"
        );

        let done = Computed {
            manifest,
            config,
            layer,
        };
        *computed = Some(done.clone());
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use crate::getter::ClientOptions;
    use tempfile::TempDir;

    #[test]
    fn test_file_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("values.yaml");
        std::fs::write(&path, "replicas: 1\n").unwrap();
        let reference = path.to_str().unwrap().to_string();

        let artifact = FileArtifact::new(reference.clone());
        let manifest = artifact.manifest().unwrap();

        assert_eq!(manifest.schema_version, 2);
        assert_eq!(manifest.media_type.as_deref(), Some(consts::OCI_MANIFEST_SCHEMA1));
        assert_eq!(manifest.config.media_type, consts::FILE_LOCAL_CONFIG_MEDIA_TYPE);
        assert_eq!(manifest.layers.len(), 1);
        assert_eq!(manifest.layers[0].digest, Digest::sha256(b"replicas: 1\n"));
        assert_eq!(manifest.layers[0].title(), Some("values.yaml"));

        let config: serde_json::Value =
            serde_json::from_slice(&artifact.raw_config().unwrap()).unwrap();
        assert_eq!(config["reference"], serde_json::json!(reference));
        assert_eq!(manifest.config.digest, Digest::sha256(&artifact.raw_config().unwrap()));
    }

    #[test]
    fn test_compute_is_memoized() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "first").unwrap();

        let artifact = FileArtifact::new(path.to_str().unwrap());
        let first = artifact.manifest().unwrap();

        // A changed source is not observed once computed.
        std::fs::write(&path, "second").unwrap();
        let second = artifact.clone().manifest().unwrap();
        assert_eq!(first, second);
        assert_eq!(artifact.layers().unwrap()[0].digest(), &Digest::sha256(b"first"));
    }

    #[test]
    fn test_annotations_and_name_override() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();

        let mut annotations = BTreeMap::new();
        annotations.insert("purpose".to_string(), "test".to_string());
        let client = Client::new(ClientOptions {
            name_override: Some("b.txt".to_string()),
            ..Default::default()
        });
        let artifact = FileArtifact::with_client(path.to_str().unwrap(), client)
            .with_annotations(annotations.clone());

        let manifest = artifact.manifest().unwrap();
        assert_eq!(manifest.annotations, Some(annotations));
        assert_eq!(manifest.layers[0].title(), Some("b.txt"));
    }

    #[test]
    fn test_missing_source_fails() {
        let artifact = FileArtifact::new("/no/such/file.txt");
        assert!(artifact.manifest().is_err());
        assert!(artifact.layers().is_err());
    }
}
