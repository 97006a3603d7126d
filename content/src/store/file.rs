//! The default file-backed store: blobs land under their title annotation.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use hauler_core::error::{HaulerError, Result};

use super::writer::{FileWriter, Progress};
use super::{ContentWriter, Pusher, Status};
use crate::digest::Digest;
use crate::manifest::Descriptor;

/// Writes titled blobs to `root/<title>`.
///
/// Blobs annotated for unpacking are gzipped tars: they are staged in a temp
/// file, verified, then extracted under `root`. Every archive entry must
/// stay under `root/<title>/`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination of a titled blob, rejecting titles that leave `root`.
    pub(crate) fn resolve(&self, title: &str) -> Result<PathBuf> {
        let relative = Path::new(title);
        if !is_contained(relative) {
            return Err(HaulerError::Unsupported(format!(
                "title '{}' escapes the store root",
                title
            )));
        }
        Ok(self.root.join(relative))
    }

    pub(crate) fn push_with(
        &self,
        descriptor: &Descriptor,
        reference: &str,
    ) -> Result<Box<dyn ContentWriter>> {
        let title = descriptor.title().ok_or_else(|| {
            HaulerError::Unsupported(format!(
                "descriptor {} has no title annotation",
                descriptor.digest
            ))
        })?;
        let path = self.resolve(title)?;
        let progress = Progress::new(reference, descriptor.size);

        if descriptor.is_unpack() {
            tracing::debug!(title, digest = %descriptor.digest, "Unpacking blob into store");
            let staging =
                tempfile::tempfile().map_err(|e| HaulerError::io("create staging file", e))?;
            return Ok(Box::new(UnpackWriter {
                staging,
                root: self.root.clone(),
                title: title.to_string(),
                progress,
            }));
        }

        tracing::debug!(path = %path.display(), digest = %descriptor.digest, "Writing titled blob");
        Ok(Box::new(FileWriter::create(&path, progress)?))
    }
}

impl Pusher for FileStore {
    fn push(&self, descriptor: &Descriptor) -> Result<Box<dyn ContentWriter>> {
        self.push_with(descriptor, &descriptor.digest.to_string())
    }
}

/// Relative, with no `..` and no root or prefix components.
fn is_contained(path: &Path) -> bool {
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    depth > 0
}

struct UnpackWriter {
    staging: File,
    root: PathBuf,
    title: String,
    progress: Progress,
}

impl Write for UnpackWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.staging.write(buf)?;
        self.progress.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.staging.flush()
    }
}

impl ContentWriter for UnpackWriter {
    fn digest(&self) -> Digest {
        self.progress.digest()
    }

    fn status(&self) -> Status {
        self.progress.status()
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if size != 0 {
            return Err(HaulerError::Unsupported(format!(
                "truncate to {} (only 0 is supported)",
                size
            )));
        }
        self.staging
            .set_len(0)
            .and_then(|_| self.staging.seek(SeekFrom::Start(0)))
            .map_err(|e| HaulerError::io("truncate staging file", e))?;
        self.progress.reset();
        Ok(())
    }

    fn commit(mut self: Box<Self>, size: Option<u64>, expected: Option<&Digest>) -> Result<()> {
        self.staging
            .flush()
            .map_err(|e| HaulerError::io("flush staging file", e))?;
        let written = self
            .staging
            .metadata()
            .map_err(|e| HaulerError::io("stat staging file", e))?
            .len();
        self.progress.verify(written, size, expected)?;

        self.staging
            .seek(SeekFrom::Start(0))
            .map_err(|e| HaulerError::io("rewind staging file", e))?;
        let count = extract(&mut self.staging, &self.root, &self.title)?;

        tracing::debug!(
            title = %self.title,
            root = %self.root.display(),
            entries = count,
            "Unpacked blob"
        );
        Ok(())
    }
}

/// Extract a gzipped tar under `root`; every entry must live under `prefix/`.
fn extract(archive: &mut File, root: &Path, prefix: &str) -> Result<usize> {
    std::fs::create_dir_all(root)
        .map_err(|e| HaulerError::io(format!("create {}", root.display()), e))?;

    let mut archive = tar::Archive::new(GzDecoder::new(archive));
    archive.set_preserve_permissions(true);
    let entries = archive
        .entries()
        .map_err(|e| HaulerError::io("read archive", e))?;

    let mut count = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| HaulerError::io("read archive entry", e))?;
        let path = entry
            .path()
            .map_err(|e| HaulerError::io("read archive entry path", e))?
            .into_owned();

        let normalized: PathBuf = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        if !is_contained(&path) || !normalized.starts_with(prefix) {
            return Err(HaulerError::Unsupported(format!(
                "archive entry '{}' is outside '{}'",
                path.display(),
                prefix
            )));
        }

        let unpacked = entry
            .unpack_in(root)
            .map_err(|e| HaulerError::io(format!("extract {}", path.display()), e))?;
        if unpacked {
            count += 1;
        }
    }
    Ok(count)
}
