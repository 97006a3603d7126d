//! A push target that names blobs by media type instead of by digest.

use std::fs::File;
use std::path::{Path, PathBuf};

use hauler_core::error::{HaulerError, Result};

use super::file::FileStore;
use super::mapper::Mapper;
use super::writer::{DiscardWriter, FileWriter, Progress};
use super::{ContentWriter, Pusher};
use crate::digest::Digest;
use crate::manifest::Descriptor;

/// Writes pushed blobs into `root` under the names a [`Mapper`] chooses.
///
/// Titled descriptors go to the default [`FileStore`]. Descriptors whose
/// media type is not mapped are hashed, verified and dropped.
#[derive(Debug, Clone)]
pub struct MappingStore {
    root: PathBuf,
    mapper: Mapper,
    default: FileStore,
}

impl MappingStore {
    pub fn new(root: impl Into<PathBuf>, mapper: Mapper) -> Self {
        let root = root.into();
        Self {
            default: FileStore::new(root.clone()),
            root,
            mapper,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A pusher for `reference`, given as `tag` or `tag@hash`.
    pub fn pusher(&self, reference: &str) -> Result<MappingPusher> {
        let (tag, hash) = match reference.split_once('@') {
            Some((tag, hash)) => (tag, Some(hash)),
            None => (reference, None),
        };
        if tag.is_empty() && hash.is_none() {
            return Err(HaulerError::Parse("empty push reference".to_string()));
        }
        let hash = hash.map(str::parse::<Digest>).transpose()?;

        Ok(MappingPusher {
            store: self.clone(),
            tag: tag.to_string(),
            hash,
        })
    }
}

/// Pusher bound to one reference of a [`MappingStore`].
#[derive(Debug, Clone)]
pub struct MappingPusher {
    store: MappingStore,
    tag: String,
    hash: Option<Digest>,
}

impl MappingPusher {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn hash(&self) -> Option<&Digest> {
        self.hash.as_ref()
    }

    fn status_ref(&self, descriptor: &Descriptor) -> String {
        if self.tag.is_empty() {
            descriptor.digest.to_string()
        } else {
            format!("{}@{}", self.tag, descriptor.digest)
        }
    }
}

impl Pusher for MappingPusher {
    fn push(&self, descriptor: &Descriptor) -> Result<Box<dyn ContentWriter>> {
        let reference = self.status_ref(descriptor);

        if descriptor.title().is_some() {
            return self.store.default.push_with(descriptor, &reference);
        }

        let progress = Progress::new(reference, descriptor.size);
        let filename = match self.store.mapper.filename(descriptor) {
            Some(filename) => filename,
            None => {
                tracing::debug!(
                    media_type = %descriptor.media_type,
                    digest = %descriptor.digest,
                    "No mapping for media type, discarding blob"
                );
                return Ok(Box::new(DiscardWriter::new(progress)));
            }
        };

        let path = self.store.default.resolve(&filename)?;
        if already_present(&path, descriptor)? {
            tracing::debug!(path = %path.display(), "Blob already present, skipping write");
            return Ok(Box::new(DiscardWriter::new(progress)));
        }

        tracing::debug!(
            path = %path.display(),
            media_type = %descriptor.media_type,
            digest = %descriptor.digest,
            "Writing mapped blob"
        );
        Ok(Box::new(FileWriter::create(&path, progress)?))
    }
}

/// Whether `path` already holds exactly the bytes `descriptor` names.
fn already_present(path: &Path, descriptor: &Descriptor) -> Result<bool> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Ok(false),
    };
    if !metadata.is_file() || metadata.len() != descriptor.size {
        return Ok(false);
    }

    let file = File::open(path).map_err(|e| HaulerError::io(format!("open {}", path.display()), e))?;
    let (digest, _) = Digest::from_reader(file)
        .map_err(|e| HaulerError::io(format!("read {}", path.display()), e))?;
    Ok(digest == descriptor.digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts;
    use std::collections::BTreeMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn push(pusher: &MappingPusher, desc: &Descriptor, data: &[u8]) -> Result<()> {
        let mut writer = pusher.push(desc)?;
        writer.write_all(data).unwrap();
        writer.commit(Some(desc.size), Some(&desc.digest))
    }

    fn descriptor(media_type: &str, data: &[u8]) -> Descriptor {
        Descriptor::new(media_type, Digest::sha256(data), data.len() as u64)
    }

    #[test]
    fn test_pusher_reference() {
        let tmp = TempDir::new().unwrap();
        let store = MappingStore::new(tmp.path(), Mapper::images());
        let hash = Digest::sha256(b"m");

        let pusher = store.pusher(&format!("busybox:latest@{}", hash)).unwrap();
        assert_eq!(pusher.tag(), "busybox:latest");
        assert_eq!(pusher.hash(), Some(&hash));

        let pusher = store.pusher("busybox:latest").unwrap();
        assert!(pusher.hash().is_none());

        assert!(matches!(
            store.pusher("busybox@sha256:nothex"),
            Err(HaulerError::InvalidDigest(_))
        ));
    }

    #[test]
    fn test_manifest_mapped() {
        let tmp = TempDir::new().unwrap();
        let store = MappingStore::new(tmp.path(), Mapper::images());
        let pusher = store.pusher("image").unwrap();

        let data = br#"{"schemaVersion":2}"#;
        let desc = descriptor(consts::OCI_MANIFEST_SCHEMA1, data);
        push(&pusher, &desc, data).unwrap();

        let written = std::fs::read(tmp.path().join("manifest.json")).unwrap();
        assert_eq!(Digest::sha256(&written), desc.digest);
        assert_eq!(written.len() as u64, desc.size);
    }

    #[test]
    fn test_layer_named_by_digest() {
        let tmp = TempDir::new().unwrap();
        let store = MappingStore::new(tmp.path(), Mapper::images());
        let pusher = store.pusher("image").unwrap();

        let desc = descriptor(consts::OCI_LAYER, b"layer bytes");
        push(&pusher, &desc, b"layer bytes").unwrap();

        let expected = tmp.path().join(format!("{}.tar.gz", desc.digest));
        assert!(expected.file_name().unwrap().to_str().unwrap().starts_with("sha256:"));
        assert_eq!(std::fs::read(expected).unwrap(), b"layer bytes");
    }

    #[test]
    fn test_unmapped_discarded_but_verified() {
        let tmp = TempDir::new().unwrap();
        let store = MappingStore::new(tmp.path(), Mapper::images());
        let pusher = store.pusher("image").unwrap();

        let desc = descriptor(consts::UNKNOWN_LAYER, b"data");
        push(&pusher, &desc, b"data").unwrap();
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);

        let err = push(&pusher, &desc, b"tampered").unwrap_err();
        assert_eq!(err.kind(), hauler_core::ErrorKind::FailedPrecondition);
    }

    #[test]
    fn test_titled_goes_to_file_store() {
        let tmp = TempDir::new().unwrap();
        let store = MappingStore::new(tmp.path(), Mapper::images());
        let pusher = store.pusher("file").unwrap();

        let mut annotations = BTreeMap::new();
        annotations.insert(consts::ANNOTATION_TITLE.to_string(), "values.yaml".to_string());
        let desc = descriptor(consts::FILE_LAYER_MEDIA_TYPE, b"a: 1").with_annotations(annotations);
        push(&pusher, &desc, b"a: 1").unwrap();

        assert_eq!(std::fs::read(tmp.path().join("values.yaml")).unwrap(), b"a: 1");
    }

    #[test]
    fn test_mismatch_leaves_file() {
        let tmp = TempDir::new().unwrap();
        let store = MappingStore::new(tmp.path(), Mapper::images());
        let pusher = store.pusher("image").unwrap();

        let desc = descriptor(consts::DOCKER_CONFIG_JSON, b"{}");
        let err = push(&pusher, &desc, b"[]").unwrap_err();
        assert!(matches!(err, HaulerError::DigestMismatch { .. }));
        assert_eq!(std::fs::read(tmp.path().join("config.json")).unwrap(), b"[]");
    }

    #[test]
    fn test_existing_blob_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let store = MappingStore::new(tmp.path(), Mapper::images());
        let pusher = store.pusher("image").unwrap();

        let desc = descriptor(consts::DOCKER_CONFIG_JSON, b"{}");
        push(&pusher, &desc, b"{}").unwrap();
        let path = tmp.path().join("config.json");
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let mut writer = pusher.push(&desc).unwrap();
        writer.write_all(b"{}").unwrap();
        assert_eq!(writer.status().reference, format!("image@{}", desc.digest));
        writer.commit(Some(2), Some(&desc.digest)).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), before);
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }
}
