//! In-memory artifacts.

use std::collections::BTreeMap;
use std::sync::Arc;

use hauler_core::error::Result;
use serde::Serialize;

use crate::config::{to_config, Config, ConfigOptions};
use crate::consts;
use crate::layer::{self, Layer, LayerOptions};
use crate::manifest::Manifest;

/// A byte slice published as a single-layer artifact.
#[derive(Debug, Clone)]
pub struct MemoryArtifact {
    layer: Layer,
    config: Config,
    annotations: BTreeMap<String, String>,
}

impl MemoryArtifact {
    /// Wrap `data` as a layer of `media_type`. The config defaults to `{}`.
    pub fn new(data: impl Into<Arc<[u8]>>, media_type: &str) -> Result<Self> {
        Self::with_layer_options(data, LayerOptions::new().media_type(media_type))
    }

    pub fn with_layer_options(data: impl Into<Arc<[u8]>>, opts: LayerOptions) -> Result<Self> {
        let layer = layer::from_bytes(data, opts)?;
        let config = to_config(
            &serde_json::json!({}),
            ConfigOptions::new().media_type(consts::MEMORY_CONFIG_MEDIA_TYPE),
        )?;
        Ok(Self {
            layer,
            config,
            annotations: BTreeMap::new(),
        })
    }

    /// Replace the config with `value`, published under the memory config type.
    pub fn with_config<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let config = to_config(
            value,
            ConfigOptions::new().media_type(consts::MEMORY_CONFIG_MEDIA_TYPE),
        )?;
        Ok(self.with_raw_config(config))
    }

    pub fn with_raw_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn media_type(&self) -> &'static str {
        consts::OCI_MANIFEST_SCHEMA1
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::new(self.config.descriptor(), vec![self.layer.descriptor()])
            .with_annotations(self.annotations.clone())
    }

    pub fn raw_config(&self) -> Vec<u8> {
        self.config.raw().to_vec()
    }

    pub fn layers(&self) -> Vec<Layer> {
        vec![self.layer.clone()]
    }
}
