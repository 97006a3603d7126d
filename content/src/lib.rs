//! Hauler Content - packages artifacts as content-addressed OCI content.
//!
//! Files, directories, HTTP downloads, container images, Helm charts and
//! image lists are described as OCI artifacts (a manifest, a config blob and
//! ordered layers) and pushed into a flat on-disk store whose filenames are
//! chosen by media type.

#![allow(clippy::result_large_err)]

pub mod artifact;
pub mod cache;
pub mod collection;
pub mod config;
pub mod consts;
pub mod digest;
pub mod getter;
pub mod layer;
pub mod manifest;
pub mod registry;
pub mod store;

// Re-export common types
pub use artifact::{Artifact, ChartArtifact, FileArtifact, ImageArtifact, MemoryArtifact};
pub use cache::{oci_cache, Cache, CachedArtifact, FsCache};
pub use collection::{ImageEntry, ImageTxt, ImageTxtOptions};
pub use config::{to_config, Config, ConfigOptions};
pub use digest::{Digest, Digester};
pub use getter::{Client, ClientOptions, Getter, GetterKind, SourceUrl};
pub use layer::{Layer, LayerOptions};
pub use manifest::{Descriptor, Manifest};
pub use registry::{RegistryAuth, RegistryClient};
pub use store::{copy, ContentWriter, FileStore, Mapper, MappingStore, Pusher, Status};

/// Hauler content version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
