//! Helm chart archives, with optional provenance.

use std::io::{self, Read};
use std::path::Component;
use std::sync::Arc;

use flate2::read::GzDecoder;
use hauler_core::error::{HaulerError, Result};
use parking_lot::Mutex;

use crate::config::{to_config, Config, ConfigOptions};
use crate::consts;
use crate::getter::Client;
use crate::layer::{self, Layer, LayerOptions, ReadStream};
use crate::manifest::Manifest;

#[derive(Debug, Clone)]
struct Computed {
    manifest: Manifest,
    config: Config,
    layers: Vec<Layer>,
}

/// A packaged chart (`.tgz`) and, optionally, its `.prov` file.
///
/// The chart layer keeps its getter-derived title so it lands under its
/// own filename; the provenance layer is untitled and maps to `prov.json`.
#[derive(Clone)]
pub struct ChartArtifact {
    source: String,
    provenance: Option<String>,
    client: Client,
    computed: Arc<Mutex<Option<Computed>>>,
}

impl std::fmt::Debug for ChartArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartArtifact")
            .field("source", &self.source)
            .field("provenance", &self.provenance)
            .finish()
    }
}

impl ChartArtifact {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_client(source, Client::default())
    }

    pub fn with_client(source: impl Into<String>, client: Client) -> Self {
        Self {
            source: source.into(),
            provenance: None,
            client,
            computed: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_provenance(mut self, source: impl Into<String>) -> Self {
        self.provenance = Some(source.into());
        self
    }

    pub fn source(&self) -> &str {
        &self.source
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
        Ok(self.compute()?.layers)
    }

    /// `Chart.yaml` of the chart, as JSON.
    pub fn metadata(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(self.compute()?.config.raw())?)
    }

    fn compute(&self) -> Result<Computed> {
        let mut computed = self.computed.lock();
        if let Some(done) = computed.as_ref() {
            return Ok(done.clone());
        }

        let chart = self
            .client
            .layer_with_media_type(&self.source, consts::CHART_LAYER_MEDIA_TYPE)?;
        let metadata = read_chart_metadata(chart.uncompressed()?).map_err(|e| match e {
            HaulerError::Parse(msg) => HaulerError::Parse(format!("{}: {}", self.source, msg)),
            other => other,
        })?;
        let config = to_config(
            &metadata,
            ConfigOptions::new().media_type(consts::CHART_CONFIG_MEDIA_TYPE),
        )?;

        let mut layers = vec![chart];
        if let Some(provenance) = &self.provenance {
            let client = self.client.clone();
            let source = provenance.clone();
            layers.push(layer::from_opener(
                move || client.open(&source).map_err(io::Error::other),
                LayerOptions::new().media_type(consts::PROV_LAYER_MEDIA_TYPE),
            )?);
        }

        let manifest = Manifest::new(
            config.descriptor(),
            layers.iter().map(Layer::descriptor).collect(),
        );

        tracing::info!(
            source = %self.source,
            name = metadata.get("name").and_then(|v| v.as_str()).unwrap_or_default(),
            version = metadata.get("version").and_then(|v| v.as_str()).unwrap_or_default(),
            provenance = self.provenance.is_some(),
            "Computed chart artifact"
        );

        let done = Computed {
            manifest,
            config,
            layers,
        };
        *computed = Some(done.clone());
        Ok(done)
    }
}

/// Find `<chart>/Chart.yaml` in a chart archive and decode it.
fn read_chart_metadata(archive: ReadStream) -> Result<serde_json::Value> {
    let mut archive = tar::Archive::new(GzDecoder::new(archive));
    let entries = archive
        .entries()
        .map_err(|e| HaulerError::io("read chart archive", e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| HaulerError::io("read chart archive", e))?;
        let path = entry
            .path()
            .map_err(|e| HaulerError::io("read chart archive", e))?
            .into_owned();

        let components: Vec<_> = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        let is_chart_yaml = components.len() == 2
            && matches!(components[1], Component::Normal(name) if name == "Chart.yaml");
        if !is_chart_yaml {
            continue;
        }

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| HaulerError::io("read Chart.yaml", e))?;
        let metadata: serde_json::Value = serde_yaml::from_str(&content)?;
        if !metadata.is_object() {
            return Err(HaulerError::Parse("Chart.yaml is not a mapping".to_string()));
        }
        return Ok(metadata);
    }

    Err(HaulerError::Parse("no Chart.yaml in chart archive".to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::digest::Digest;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::path::Path;
    use tempfile::TempDir;

    /// Write a minimal chart archive named `<name>-<version>.tgz` under `dir`.
    pub(crate) fn write_chart(dir: &Path, name: &str, version: &str) -> std::path::PathBuf {
        let path = dir.join(format!("{}-{}.tgz", name, version));
        let file = std::fs::File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

        let chart_yaml = format!(
            "apiVersion: v2\nname: {}\nversion: {}\ndescription: test chart\n",
            name, version
        );
        let files = [
            (format!("{}/Chart.yaml", name), chart_yaml),
            (format!("{}/values.yaml", name), "replicas: 1\n".to_string()),
        ];
        for (entry, content) in &files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, entry, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_chart_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = write_chart(tmp.path(), "podinfo", "6.0.0");
        let data = std::fs::read(&path).unwrap();

        let chart = ChartArtifact::new(path.to_str().unwrap());
        let manifest = chart.manifest().unwrap();

        assert_eq!(manifest.config.media_type, consts::CHART_CONFIG_MEDIA_TYPE);
        assert_eq!(manifest.layers.len(), 1);
        assert_eq!(manifest.layers[0].media_type, consts::CHART_LAYER_MEDIA_TYPE);
        assert_eq!(manifest.layers[0].digest, Digest::sha256(&data));
        assert_eq!(manifest.layers[0].title(), Some("podinfo-6.0.0.tgz"));

        let metadata = chart.metadata().unwrap();
        assert_eq!(metadata["name"], "podinfo");
        assert_eq!(metadata["version"], "6.0.0");
        assert_eq!(manifest.config.digest, Digest::sha256(&chart.raw_config().unwrap()));
    }

    #[test]
    fn test_chart_with_provenance() {
        let tmp = TempDir::new().unwrap();
        let path = write_chart(tmp.path(), "podinfo", "6.0.0");
        let prov = tmp.path().join("podinfo-6.0.0.tgz.prov");
        std::fs::write(&prov, "-----BEGIN PGP SIGNED MESSAGE-----\n").unwrap();

        let chart = ChartArtifact::new(path.to_str().unwrap()).with_provenance(prov.to_str().unwrap());
        let layers = chart.layers().unwrap();

        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].media_type(), consts::PROV_LAYER_MEDIA_TYPE);
        assert!(layers[1].descriptor().title().is_none());
    }

    #[test]
    fn test_archive_without_chart_yaml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.tgz");
        let file = std::fs::File::create(&path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(1);
        header.set_cksum();
        builder.append_data(&mut header, "broken/values.yaml", &b"x"[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let err = ChartArtifact::new(path.to_str().unwrap()).manifest().unwrap_err();
        assert!(matches!(err, HaulerError::Parse(msg) if msg.contains("no Chart.yaml")));
    }
}
