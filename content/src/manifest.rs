//! OCI v1 descriptor and image manifest.
//!
//! Field order and names follow the OCI image spec so that serialized
//! manifests hash the same as those produced by other OCI tooling.
//! Annotations use a `BTreeMap` so serialization is deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::consts;
use crate::digest::Digest;

/// A typed, content-addressed pointer to a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    /// Exact byte length of the referenced blob.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            urls: None,
            annotations: None,
        }
    }

    /// Attach annotations. An empty map is dropped so it is omitted on the wire.
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        };
        self
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Filename recorded in the `org.opencontainers.image.title` annotation.
    pub fn title(&self) -> Option<&str> {
        self.annotation(consts::ANNOTATION_TITLE)
            .filter(|title| !title.is_empty())
    }

    /// Whether the blob should be extracted rather than stored verbatim.
    pub fn is_unpack(&self) -> bool {
        self.annotation(consts::ANNOTATION_UNPACK) == Some("true")
    }
}

/// OCI v1 image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Always 2.
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    /// Ordered bottom to top.
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Manifest {
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: Some(consts::OCI_MANIFEST_SCHEMA1.to_string()),
            config,
            layers,
            annotations: None,
        }
    }

    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = if annotations.is_empty() {
            None
        } else {
            Some(annotations)
        };
        self
    }

    /// Serialized manifest bytes.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
