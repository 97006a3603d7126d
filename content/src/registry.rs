//! OCI registry client backing image artifacts.
//!
//! Uses the `oci-distribution` crate to talk to container registries. The
//! crate is async; [`RegistryClient`] owns a small current-thread runtime and
//! blocks on it so image artifacts expose the same synchronous surface as
//! every other artifact kind. Do not call it from inside an async task; use
//! `spawn_blocking` there.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Seek, SeekFrom};

use hauler_core::config::RegistryConfig;
use hauler_core::error::{HaulerError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{ImageIndexEntry, OciDescriptor, OciImageManifest, OciManifest};
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;

use crate::digest::Digest;
use crate::manifest::{Descriptor, Manifest};

/// Credentials presented to the registry an image is pulled from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegistryAuth {
    #[default]
    Anonymous,
    Basic { username: String, password: String },
}

impl RegistryAuth {
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `REGISTRY_USERNAME` / `REGISTRY_PASSWORD`, anonymous unless both are set.
    pub fn from_env() -> Self {
        Self::from_pair(
            std::env::var("REGISTRY_USERNAME").ok(),
            std::env::var("REGISTRY_PASSWORD").ok(),
        )
    }

    fn from_pair(username: Option<String>, password: Option<String>) -> Self {
        match (username, password) {
            (Some(username), Some(password)) => Self::Basic { username, password },
            _ => Self::Anonymous,
        }
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match self {
            Self::Anonymous => OciRegistryAuth::Anonymous,
            Self::Basic { username, password } => {
                OciRegistryAuth::Basic(username.clone(), password.clone())
            }
        }
    }
}

impl From<&RegistryConfig> for RegistryAuth {
    fn from(config: &RegistryConfig) -> Self {
        Self::from_pair(config.username.clone(), config.password.clone())
    }
}

/// Parse an image name (`nginx:1.19`, `quay.io/org/img@sha256:...`).
///
/// Short names resolve against Docker Hub the way `docker pull` does.
pub fn parse_reference(name: &str) -> Result<Reference> {
    let invalid = |message: String| HaulerError::InvalidReference {
        reference: name.to_string(),
        message,
    };

    let reference = name
        .trim()
        .parse::<Reference>()
        .map_err(|e| invalid(e.to_string()))?;

    // Repository paths are lowercase; the parser only rejects them when the
    // uppercase part lands in the first component.
    let repository = reference.repository();
    if let Some(c) = repository
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-' | '/'))
    {
        return Err(invalid(format!(
            "repository '{}' contains invalid character '{}'",
            repository, c
        )));
    }
    Ok(reference)
}

/// Manifest, config and digest of a pulled image.
#[derive(Debug, Clone)]
pub(crate) struct RemoteImage {
    pub manifest: OciImageManifest,
    pub digest: String,
    pub config: String,
}

/// Synchronous facade over the async registry client.
pub struct RegistryClient {
    client: Client,
    auth: RegistryAuth,
    runtime: Runtime,
}

impl RegistryClient {
    /// Anonymous client speaking https.
    pub fn new() -> Result<Self> {
        Self::with_auth(RegistryAuth::anonymous(), false)
    }

    /// Client presenting `auth`. Plain http is used when `insecure` is set.
    pub fn with_auth(auth: RegistryAuth, insecure: bool) -> Result<Self> {
        let config = ClientConfig {
            protocol: if insecure {
                ClientProtocol::Http
            } else {
                ClientProtocol::Https
            },
            platform_resolver: Some(Box::new(linux_platform_resolver)),
            ..Default::default()
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| HaulerError::io("start registry runtime", e))?;

        Ok(Self {
            client: Client::new(config),
            auth,
            runtime,
        })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Self::with_auth(config.into(), config.insecure)
    }

    /// Whether `name` resolves to an image index rather than a single manifest.
    pub fn is_multi_arch(&self, name: &str) -> Result<bool> {
        let reference = parse_reference(name)?;
        let auth = self.auth.to_oci_auth();
        let (manifest, _digest) = self
            .runtime
            .block_on(self.client.pull_manifest(&reference, &auth))
            .map_err(|e| registry_error(&reference, "Failed to pull manifest", e))?;

        Ok(matches!(manifest, OciManifest::ImageIndex(_)))
    }

    /// Pull the platform manifest and config of an image.
    pub(crate) fn fetch(&self, reference: &Reference) -> Result<RemoteImage> {
        tracing::info!(reference = %reference, "Fetching image manifest");

        let auth = self.auth.to_oci_auth();
        let (manifest, digest, config) = self
            .runtime
            .block_on(self.client.pull_manifest_and_config(reference, &auth))
            .map_err(|e| registry_error(reference, "Failed to pull manifest", e))?;

        tracing::debug!(
            reference = %reference,
            digest = %digest,
            layers = manifest.layers.len(),
            "Fetched image manifest"
        );

        Ok(RemoteImage {
            manifest,
            digest,
            config,
        })
    }

    /// Download a blob into an anonymous temp file and rewind it.
    pub(crate) fn pull_blob(&self, reference: &Reference, descriptor: &OciDescriptor) -> Result<File> {
        tracing::debug!(
            reference = %reference,
            digest = %descriptor.digest,
            size = descriptor.size,
            "Pulling blob"
        );

        let mut file = tempfile::tempfile().map_err(|e| HaulerError::io("create blob file", e))?;
        let handle = file
            .try_clone()
            .map_err(|e| HaulerError::io("clone blob file", e))?;

        self.runtime
            .block_on(async {
                let mut out = tokio::fs::File::from_std(handle);
                self.client.pull_blob(reference, descriptor, &mut out).await?;
                out.flush().await?;
                Ok::<_, oci_distribution::errors::OciDistributionError>(())
            })
            .map_err(|e| {
                registry_error(reference, &format!("Failed to pull blob {}", descriptor.digest), e)
            })?;

        file.seek(SeekFrom::Start(0))
            .map_err(|e| HaulerError::io("rewind blob file", e))?;
        Ok(file)
    }
}

fn registry_error(reference: &Reference, what: &str, err: impl std::fmt::Display) -> HaulerError {
    HaulerError::Registry {
        registry: reference.resolve_registry().to_string(),
        message: format!("{} for {}: {}", what, reference, err),
    }
}

/// Convert a registry descriptor into ours, validating its digest and size.
pub(crate) fn to_descriptor(desc: &OciDescriptor) -> Result<Descriptor> {
    let digest: Digest = desc.digest.parse()?;
    let size = u64::try_from(desc.size).map_err(|_| {
        HaulerError::Parse(format!("negative size {} for {}", desc.size, desc.digest))
    })?;

    let mut out = Descriptor::new(desc.media_type.clone(), digest, size);
    out.urls = desc.urls.clone();
    if let Some(annotations) = &desc.annotations {
        out = out.with_annotations(
            annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        );
    }
    Ok(out)
}

/// Convert a registry image manifest into ours.
pub(crate) fn to_manifest(manifest: &OciImageManifest) -> Result<Manifest> {
    let layers = manifest
        .layers
        .iter()
        .map(to_descriptor)
        .collect::<Result<Vec<_>>>()?;

    let mut out = Manifest::new(to_descriptor(&manifest.config)?, layers);
    out.schema_version = u32::from(manifest.schema_version);
    out.media_type = manifest.media_type.clone();
    if let Some(annotations) = &manifest.annotations {
        out = out.with_annotations(
            annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
    }
    Ok(out)
}

/// Picks the linux entry of an image index built for the host CPU.
fn linux_platform_resolver(entries: &[ImageIndexEntry]) -> Option<String> {
    let arch = oci_arch(std::env::consts::ARCH);
    entries
        .iter()
        .filter_map(|entry| entry.platform.as_ref().map(|p| (entry, p)))
        .find(|(_, p)| p.os == "linux" && p.architecture == arch)
        .map(|(entry, _)| entry.digest.clone())
}

/// Rust target arch to the GOARCH spelling registries use.
fn oci_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}
