//! Media type to filename mappings used when pushing to a [`MappingStore`].
//!
//! [`MappingStore`]: super::MappingStore

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::consts;
use crate::manifest::Descriptor;

type FilenameFn = Arc<dyn Fn(&Descriptor) -> String + Send + Sync>;

#[derive(Clone, Default)]
pub struct Mapper {
    entries: HashMap<String, FilenameFn>,
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut media_types: Vec<_> = self.entries.keys().collect();
        media_types.sort();
        f.debug_struct("Mapper")
            .field("media_types", &media_types)
            .finish()
    }
}

impl Mapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `media_type` to the filename `filename` derives from a descriptor.
    pub fn with<F>(mut self, media_type: impl Into<String>, filename: F) -> Self
    where
        F: Fn(&Descriptor) -> String + Send + Sync + 'static,
    {
        self.entries.insert(media_type.into(), Arc::new(filename));
        self
    }

    /// Map `media_type` to a fixed filename.
    pub fn with_name(self, media_type: impl Into<String>, name: &'static str) -> Self {
        self.with(media_type, move |_| name.to_string())
    }

    pub fn contains(&self, media_type: &str) -> bool {
        self.entries.contains_key(media_type)
    }

    /// Filename for `descriptor`, if its media type is mapped.
    pub fn filename(&self, descriptor: &Descriptor) -> Option<String> {
        self.entries
            .get(&descriptor.media_type)
            .map(|filename| filename(descriptor))
    }

    /// Container images: `manifest.json`, `config.json` and one
    /// `<digest>.tar.gz` per layer.
    pub fn images() -> Self {
        let layer = |d: &Descriptor| format!("{}.tar.gz", d.digest);
        Self::new()
            .with_name(consts::OCI_MANIFEST_SCHEMA1, "manifest.json")
            .with_name(consts::DOCKER_MANIFEST_SCHEMA2, "manifest.json")
            .with_name(consts::DOCKER_MANIFEST_LIST_SCHEMA2, "manifest.json")
            .with_name(consts::DOCKER_CONFIG_JSON, "config.json")
            .with_name(consts::OCI_IMAGE_CONFIG, "config.json")
            .with(consts::OCI_LAYER, layer)
            .with(consts::DOCKER_LAYER, layer)
    }

    /// Helm charts: the chart archive under its title and the provenance
    /// file as `prov.json`.
    pub fn charts() -> Self {
        Self::new()
            .with(consts::CHART_LAYER_MEDIA_TYPE, |d: &Descriptor| {
                d.title().unwrap_or("chart.tar.gz").to_string()
            })
            .with_name(consts::PROV_LAYER_MEDIA_TYPE, "prov.json")
    }
}
