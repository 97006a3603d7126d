//! Pushing artifacts to disk.
//!
//! A [`Pusher`] hands out one [`ContentWriter`] per descriptor. Writers hash
//! what they receive and check it against the declared size and digest on
//! [`ContentWriter::commit`].

pub mod file;
pub mod mapper;
pub mod mapping;
pub mod writer;

pub use file::FileStore;
pub use mapper::Mapper;
pub use mapping::{MappingPusher, MappingStore};
pub use writer::{DiscardWriter, FileWriter};

use std::io::{self, Read, Write};

use chrono::{DateTime, Utc};
use hauler_core::error::{HaulerError, Result};
use serde::Serialize;

use crate::artifact::Artifact;
use crate::digest::Digest;
use crate::manifest::Descriptor;

/// Progress of an in-flight write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    #[serde(rename = "ref")]
    pub reference: String,
    pub total: u64,
    pub offset: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub trait ContentWriter: Write + Send {
    /// Digest of the bytes written so far.
    fn digest(&self) -> Digest;

    fn status(&self) -> Status;

    /// Discard everything written. Only `0` is supported.
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Finish the write, checking `size` and `expected` when given.
    fn commit(self: Box<Self>, size: Option<u64>, expected: Option<&Digest>) -> Result<()>;
}

pub trait Pusher: Send + Sync {
    fn push(&self, descriptor: &Descriptor) -> Result<Box<dyn ContentWriter>>;
}

/// Push `artifact` through `pusher`: config, layers in order, then manifest.
///
/// Returns the descriptor of the pushed manifest.
pub fn copy(artifact: &Artifact, pusher: &dyn Pusher) -> Result<Descriptor> {
    let manifest = artifact.manifest()?;

    let raw_config = artifact.raw_config()?;
    push_reader(pusher, &manifest.config, &raw_config[..])?;

    for layer in artifact.layers()? {
        let descriptor = layer.descriptor();
        push_reader(pusher, &descriptor, layer.compressed()?)?;
    }

    let raw_manifest = manifest.to_bytes()?;
    let descriptor = Descriptor::new(
        artifact.media_type()?,
        Digest::sha256(&raw_manifest),
        raw_manifest.len() as u64,
    );
    push_reader(pusher, &descriptor, &raw_manifest[..])?;

    tracing::info!(
        digest = %descriptor.digest,
        layers = manifest.layers.len(),
        "Pushed artifact"
    );
    Ok(descriptor)
}

fn push_reader(pusher: &dyn Pusher, descriptor: &Descriptor, mut reader: impl Read) -> Result<()> {
    let mut writer = pusher.push(descriptor)?;
    io::copy(&mut reader, &mut writer)
        .map_err(|e| HaulerError::io(format!("push {}", descriptor.digest), e))?;
    writer.commit(Some(descriptor.size), Some(&descriptor.digest))
}
