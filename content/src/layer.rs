//! Layers built from restartable byte streams.
//!
//! A layer never holds its bytes. It holds an *opener*: a function that
//! yields a fresh reader over the same content every time it is called.
//! Digests are computed by streaming through the opener, so nothing has
//! to be buffered whole in memory.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use hauler_core::error::{HaulerError, Result};

use crate::consts;
use crate::digest::Digest;
use crate::manifest::Descriptor;

/// A boxed byte stream.
pub type ReadStream = Box<dyn Read + Send>;

/// Restartable stream factory. Each call must yield identical bytes.
pub type Opener = Arc<dyn Fn() -> io::Result<ReadStream> + Send + Sync>;

/// Options for [`from_opener`].
#[derive(Debug, Clone)]
pub struct LayerOptions {
    media_type: String,
    annotations: BTreeMap<String, String>,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            media_type: consts::UNKNOWN_LAYER.to_string(),
            annotations: BTreeMap::new(),
        }
    }
}

impl LayerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Replace the annotation map.
    pub fn annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }
}

/// A content-addressed layer.
///
/// `digest` covers the compressed stream and `diff_id` the uncompressed one;
/// for content that is not separately compressed the two are equal.
#[derive(Clone)]
pub struct Layer {
    descriptor: Descriptor,
    diff_id: Digest,
    compressed: Opener,
    uncompressed: Opener,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("media_type", &self.descriptor.media_type)
            .field("digest", &self.descriptor.digest)
            .field("diff_id", &self.diff_id)
            .field("size", &self.descriptor.size)
            .finish()
    }
}

/// Build a layer whose compressed and uncompressed streams are both `open`.
///
/// The opener is invoked twice, once per hash. If the two passes disagree
/// the opener is not restartable and the layer is rejected.
pub fn from_opener<F>(open: F, opts: LayerOptions) -> Result<Layer>
where
    F: Fn() -> io::Result<ReadStream> + Send + Sync + 'static,
{
    let open: Opener = Arc::new(open);

    let (digest, size) = hash_stream(&open)?;
    let (diff_id, _) = hash_stream(&open)?;
    if digest != diff_id {
        return Err(HaulerError::DigestMismatch {
            expected: digest.to_string(),
            actual: diff_id.to_string(),
        });
    }

    tracing::debug!(
        digest = %digest,
        size,
        media_type = %opts.media_type,
        "Built layer from opener"
    );

    let descriptor = Descriptor::new(opts.media_type, digest, size).with_annotations(opts.annotations);
    Ok(Layer {
        descriptor,
        diff_id,
        compressed: open.clone(),
        uncompressed: open,
    })
}

/// Build a layer over an in-memory byte slice.
pub fn from_bytes(data: impl Into<Arc<[u8]>>, opts: LayerOptions) -> Result<Layer> {
    let data: Arc<[u8]> = data.into();
    from_opener(
        move || Ok(Box::new(io::Cursor::new(data.clone())) as ReadStream),
        opts,
    )
}

fn hash_stream(open: &Opener) -> Result<(Digest, u64)> {
    let reader = open().map_err(|e| HaulerError::io("open layer source", e))?;
    Digest::from_reader(reader).map_err(|e| HaulerError::io("read layer source", e))
}

impl Layer {
    /// Assemble a layer whose hashes are already known.
    pub fn with_openers(
        descriptor: Descriptor,
        diff_id: Digest,
        compressed: Opener,
        uncompressed: Opener,
    ) -> Self {
        Self {
            descriptor,
            diff_id,
            compressed,
            uncompressed,
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.descriptor.digest
    }

    pub fn diff_id(&self) -> &Digest {
        &self.diff_id
    }

    /// Byte length of the compressed stream.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn media_type(&self) -> &str {
        &self.descriptor.media_type
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.descriptor.annotations.clone().unwrap_or_default()
    }

    /// Descriptor of the compressed blob, annotations included.
    pub fn descriptor(&self) -> Descriptor {
        self.descriptor.clone()
    }

    pub fn compressed(&self) -> Result<ReadStream> {
        (self.compressed)()
            .map_err(|e| HaulerError::io(format!("open layer {}", self.descriptor.digest), e))
    }

    pub fn uncompressed(&self) -> Result<ReadStream> {
        (self.uncompressed)()
            .map_err(|e| HaulerError::io(format!("open layer {}", self.descriptor.digest), e))
    }

    pub(crate) fn compressed_opener(&self) -> Opener {
        self.compressed.clone()
    }

    pub(crate) fn uncompressed_opener(&self) -> Opener {
        self.uncompressed.clone()
    }
}
