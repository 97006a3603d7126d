//! Plain-text image lists.
//!
//! One image reference per line, optionally followed by a single space and a
//! comma-separated list of source tags:
//!
//! ```text
//! # comment
//! busybox core
//! quay.io/jetstack/cert-manager-controller:v1.6.1 cert-manager
//! ```
//!
//! Source tags drive include/exclude filtering; see [`ImageTxtOptions`].

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;

use hauler_core::error::{HaulerError, Result};
use parking_lot::Mutex;

use crate::artifact::{Artifact, ImageArtifact};
use crate::getter::Client;
use crate::registry::{self, RegistryClient};

/// One parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub reference: String,
    pub sources: BTreeSet<String>,
}

/// Source filters applied after parsing.
#[derive(Debug, Clone, Default)]
pub struct ImageTxtOptions {
    pub include_sources: BTreeSet<String>,
    pub exclude_sources: BTreeSet<String>,
}

impl ImageTxtOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_sources.extend(sources.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_sources.extend(sources.into_iter().map(Into::into));
        self
    }
}

/// Parse an image list. Blank lines and `#` comments are skipped.
pub fn parse<R: Read>(reader: R) -> Result<Vec<ImageEntry>> {
    let mut entries = Vec::new();

    for line in BufReader::new(reader).lines() {
        let line = line.map_err(|e| HaulerError::io("read image list", e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split(' ').collect();
        let (reference, sources) = match parts.as_slice() {
            [reference] => (*reference, BTreeSet::new()),
            [reference, sources] => (
                *reference,
                sources
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => {
                return Err(HaulerError::Parse(format!(
                    "invalid image list line '{}'",
                    line
                )))
            }
        };

        registry::parse_reference(reference)?;
        entries.push(ImageEntry {
            reference: reference.to_string(),
            sources,
        });
    }

    Ok(entries)
}

/// Apply source filters to parsed entries.
///
/// Nothing is filtered when no entry has sources or when neither filter is
/// set. A non-empty include keeps entries sharing a source with it, and
/// exclude is then ignored. An exclude alone drops entries whose sources all
/// fall inside it.
pub fn filter(entries: Vec<ImageEntry>, opts: &ImageTxtOptions) -> Vec<ImageEntry> {
    let any_sources = entries.iter().any(|e| !e.sources.is_empty());
    if !any_sources || (opts.include_sources.is_empty() && opts.exclude_sources.is_empty()) {
        return entries;
    }

    if !opts.include_sources.is_empty() {
        if !opts.exclude_sources.is_empty() {
            tracing::warn!(
                include = ?opts.include_sources,
                exclude = ?opts.exclude_sources,
                "Both include and exclude sources given, ignoring exclude"
            );
        }
        return entries
            .into_iter()
            .filter(|e| !e.sources.is_disjoint(&opts.include_sources))
            .collect();
    }

    entries
        .into_iter()
        .filter(|e| !e.sources.is_subset(&opts.exclude_sources))
        .collect()
}

enum Source {
    Getter { reference: String, client: Client },
    Text(Arc<str>),
}

/// A collection of image artifacts read from an image list.
///
/// The list is read and filtered on the first call to [`ImageTxt::contents`];
/// later calls return the same set. A failed read is retried next time.
pub struct ImageTxt {
    source: Source,
    opts: ImageTxtOptions,
    registry: Mutex<Option<Arc<RegistryClient>>>,
    contents: Mutex<Option<BTreeMap<String, Artifact>>>,
}

impl ImageTxt {
    /// An image list fetched through the getters (local path or URL).
    pub fn new(reference: impl Into<String>, opts: ImageTxtOptions) -> Self {
        Self::with_client(reference, Client::default(), opts)
    }

    pub fn with_client(reference: impl Into<String>, client: Client, opts: ImageTxtOptions) -> Self {
        Self::from_source(
            Source::Getter {
                reference: reference.into(),
                client,
            },
            opts,
        )
    }

    /// An image list already in memory.
    pub fn from_text(text: impl Into<Arc<str>>, opts: ImageTxtOptions) -> Self {
        Self::from_source(Source::Text(text.into()), opts)
    }

    fn from_source(source: Source, opts: ImageTxtOptions) -> Self {
        Self {
            source,
            opts,
            registry: Mutex::new(None),
            contents: Mutex::new(None),
        }
    }

    /// Use `registry` for every image instead of an anonymous client.
    pub fn with_registry(self, registry: Arc<RegistryClient>) -> Self {
        *self.registry.lock() = Some(registry);
        self
    }

    /// Filtered entries, keyed by canonical reference (`docker.io/library/busybox:latest`).
    pub fn contents(&self) -> Result<BTreeMap<String, Artifact>> {
        let mut contents = self.contents.lock();
        if let Some(done) = contents.as_ref() {
            return Ok(done.clone());
        }

        let entries = match &self.source {
            Source::Getter { reference, client } => {
                tracing::debug!(source = %reference, "Reading image list");
                parse(client.open(reference)?)?
            }
            Source::Text(text) => parse(text.as_bytes())?,
        };
        let found = entries.len();
        let entries = filter(entries, &self.opts);

        let registry = self.registry()?;
        let mut artifacts = BTreeMap::new();
        for entry in entries {
            let image = ImageArtifact::new(&entry.reference, registry.clone())?;
            artifacts.insert(image.reference().whole(), Artifact::from(image));
        }

        tracing::info!(found, selected = artifacts.len(), "Loaded image list");
        *contents = Some(artifacts.clone());
        Ok(artifacts)
    }

    fn registry(&self) -> Result<Arc<RegistryClient>> {
        let mut registry = self.registry.lock();
        if let Some(client) = registry.as_ref() {
            return Ok(client.clone());
        }
        let client = Arc::new(RegistryClient::new()?);
        *registry = Some(client.clone());
        Ok(client)
    }
}
