//! Getters turn an opaque source reference into bytes, a name and a config.
//!
//! The [`Client`] tries each registered getter in order (file, directory,
//! http) and hands the first one that claims the source to the layer
//! builder. Getter detection is disjoint: a local path is either a regular
//! file or a directory, and only `http(s)` URLs reach the network.

mod directory;
mod file;
mod http;

use std::collections::BTreeMap;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use hauler_core::error::{HaulerError, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{self, Config, ConfigOptions};
use crate::consts;
use crate::layer::{self, Layer, LayerOptions, ReadStream};

pub use directory::DirectoryGetter;
pub use file::FileGetter;
pub use http::HttpGetter;

/// Which built-in strategy a getter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetterKind {
    File,
    Directory,
    Http,
}

/// Pluggable source strategy.
pub trait Getter: Send + Sync {
    fn kind(&self) -> GetterKind;

    /// Whether this getter can serve `source`.
    fn detect(&self, source: &SourceUrl) -> bool;

    /// Filename the source should be published under.
    fn name(&self, source: &SourceUrl) -> Result<String>;

    /// Open a fresh stream over the source's bytes.
    fn open(&self, cancel: &CancellationToken, source: &SourceUrl) -> Result<ReadStream>;

    /// Open the source as it will be published under `name`.
    ///
    /// Only archives care: their entries are rooted at the published name.
    fn open_as(
        &self,
        cancel: &CancellationToken,
        source: &SourceUrl,
        _name: &str,
    ) -> Result<ReadStream> {
        self.open(cancel, source)
    }

    /// Config blob describing the source.
    fn config(&self, source: &SourceUrl) -> Result<Config>;
}

/// A parsed source reference: either an absolute URL or a local path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    raw: String,
    url: Option<Url>,
}

impl SourceUrl {
    pub fn parse(source: &str) -> Result<Self> {
        let raw = source.trim().to_string();
        if raw.is_empty() {
            return Err(HaulerError::Parse("empty source reference".to_string()));
        }

        match Url::parse(&raw) {
            // Single letter schemes are Windows drive letters, not URLs.
            Ok(url) if url.scheme().len() > 1 => Ok(Self {
                raw,
                url: Some(url),
            }),
            Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Self { raw, url: None }),
            Err(e) => Err(HaulerError::Parse(format!(
                "malformed source URL '{}': {}",
                raw, e
            ))),
        }
    }

    /// Source exactly as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// URL scheme, or an empty string for plain paths.
    pub fn scheme(&self) -> &str {
        self.url.as_ref().map(|u| u.scheme()).unwrap_or("")
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Local filesystem path named by the source, joining `host + path` for
    /// `file://` URLs.
    pub fn local_path(&self) -> Option<PathBuf> {
        match &self.url {
            None => Some(PathBuf::from(&self.raw)),
            Some(url) if url.scheme() == "file" => {
                let host = url.host_str().unwrap_or("");
                Some(PathBuf::from(format!("{}{}", host, url.path())))
            }
            Some(_) => None,
        }
    }
}

/// Config payload recorded for every getter-backed artifact.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SourceConfig<'a> {
    pub reference: &'a str,
}

pub(crate) fn source_config(source: &SourceUrl, media_type: &str) -> Result<Config> {
    config::to_config(
        &SourceConfig {
            reference: source.as_str(),
        },
        ConfigOptions::new().media_type(media_type),
    )
}

/// Reader that fails once its token is cancelled.
pub struct Cancellable<R> {
    inner: R,
    cancel: CancellationToken,
}

impl<R: Read> Cancellable<R> {
    pub fn new(inner: R, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }
}

impl<R: Read> Read for Cancellable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("operation cancelled"));
        }
        self.inner.read(buf)
    }
}

/// Options for [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Replaces the getter-computed title when non-empty.
    pub name_override: Option<String>,
    /// Aborts in-flight reads when cancelled.
    pub cancel: CancellationToken,
}

/// Dispatches sources to the first getter that detects them.
#[derive(Clone)]
pub struct Client {
    getters: Vec<Arc<dyn Getter>>,
    options: ClientOptions,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl Client {
    /// Client with the default getters, in order: file, directory, http.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_getters(
            vec![
                Arc::new(FileGetter),
                Arc::new(DirectoryGetter),
                Arc::new(HttpGetter::new()),
            ],
            options,
        )
    }

    pub fn with_getters(getters: Vec<Arc<dyn Getter>>, options: ClientOptions) -> Self {
        Self { getters, options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// First getter that detects `source`.
    pub fn getter(&self, source: &SourceUrl) -> Result<Arc<dyn Getter>> {
        self.getters
            .iter()
            .find(|g| g.detect(source))
            .cloned()
            .ok_or_else(|| HaulerError::UnknownGetter {
                source_ref: source.as_str().to_string(),
            })
    }

    /// Published name of `source`, honoring the name override.
    pub fn name(&self, source: &str) -> Result<String> {
        if let Some(name) = self.name_override() {
            return Ok(name.to_string());
        }
        let source = SourceUrl::parse(source)?;
        self.getter(&source)?.name(&source)
    }

    pub fn config(&self, source: &str) -> Result<Config> {
        let source = SourceUrl::parse(source)?;
        self.getter(&source)?.config(&source)
    }

    /// Stream the source once, outside of any layer.
    pub fn open(&self, source: &str) -> Result<ReadStream> {
        let source = SourceUrl::parse(source)?;
        self.getter(&source)?.open(&self.options.cancel, &source)
    }

    /// Build a lazily re-readable layer over `source`.
    ///
    /// The layer is titled with the source's name and, for directories,
    /// flagged for unpacking.
    pub fn layer_from(&self, source: &str) -> Result<Layer> {
        self.layer_with_media_type(source, consts::FILE_LAYER_MEDIA_TYPE)
    }

    /// [`Client::layer_from`] publishing the layer under `media_type`.
    pub fn layer_with_media_type(&self, source: &str, media_type: &str) -> Result<Layer> {
        let source = SourceUrl::parse(source)?;
        let getter = self.getter(&source)?;

        let title = match self.name_override() {
            Some(name) => name.to_string(),
            None => getter.name(&source)?,
        };

        let mut annotations = BTreeMap::new();
        annotations.insert(consts::ANNOTATION_TITLE.to_string(), title.clone());
        if getter.kind() == GetterKind::Directory {
            annotations.insert(consts::ANNOTATION_UNPACK.to_string(), "true".to_string());
        }

        tracing::debug!(
            source = %source.as_str(),
            getter = ?getter.kind(),
            "Building layer from source"
        );

        let cancel = self.options.cancel.clone();
        let opener_source = source.clone();
        layer::from_opener(
            move || {
                getter
                    .open_as(&cancel, &opener_source, &title)
                    .map_err(io::Error::other)
            },
            LayerOptions::new()
                .media_type(media_type)
                .annotations(annotations),
        )
    }

    fn name_override(&self) -> Option<&str> {
        self.options
            .name_override
            .as_deref()
            .filter(|name| !name.is_empty())
    }
}
