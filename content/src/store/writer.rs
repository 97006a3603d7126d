//! Verifying content writers.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hauler_core::error::{HaulerError, Result};

use super::{ContentWriter, Status};
use crate::digest::{Digest, Digester};

/// Running hash and offset of one blob write.
#[derive(Clone)]
pub(crate) struct Progress {
    reference: String,
    total: u64,
    offset: u64,
    digester: Digester,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Progress {
    pub(crate) fn new(reference: impl Into<String>, total: u64) -> Self {
        let now = Utc::now();
        Self {
            reference: reference.into(),
            total,
            offset: 0,
            digester: Digester::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.digester.update(data);
        self.offset += data.len() as u64;
        self.updated_at = Utc::now();
    }

    pub(crate) fn reset(&mut self) {
        self.digester = Digester::new();
        self.offset = 0;
        self.updated_at = Utc::now();
    }

    pub(crate) fn digest(&self) -> Digest {
        self.digester.digest()
    }

    pub(crate) fn status(&self) -> Status {
        Status {
            reference: self.reference.clone(),
            total: self.total,
            offset: self.offset,
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }

    /// Check a written blob of `actual_size` bytes against what was declared.
    pub(crate) fn verify(
        &self,
        actual_size: u64,
        size: Option<u64>,
        expected: Option<&Digest>,
    ) -> Result<()> {
        if let Some(size) = size {
            if size != actual_size {
                return Err(HaulerError::SizeMismatch {
                    expected: size,
                    actual: actual_size,
                });
            }
        }

        if let Some(expected) = expected {
            let actual = self.digest();
            if &actual != expected {
                return Err(HaulerError::DigestMismatch {
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn unsupported_truncate(size: u64) -> HaulerError {
    HaulerError::Unsupported(format!("truncate to {} (only 0 is supported)", size))
}

/// Writes a blob to a named file.
///
/// The file is truncated on open. A failed commit leaves the written bytes
/// in place; removing them is up to the caller.
pub struct FileWriter {
    file: File,
    path: PathBuf,
    progress: Progress,
}

impl FileWriter {
    pub(crate) fn create(path: &Path, progress: Progress) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HaulerError::io(format!("create {}", parent.display()), e))?;
        }
        let file = File::create(path)
            .map_err(|e| HaulerError::io(format!("create {}", path.display()), e))?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            progress,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.progress.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl ContentWriter for FileWriter {
    fn digest(&self) -> Digest {
        self.progress.digest()
    }

    fn status(&self) -> Status {
        self.progress.status()
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if size != 0 {
            return Err(unsupported_truncate(size));
        }
        self.file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .map_err(|e| HaulerError::io(format!("truncate {}", self.path.display()), e))?;
        self.progress.reset();
        Ok(())
    }

    fn commit(mut self: Box<Self>, size: Option<u64>, expected: Option<&Digest>) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| HaulerError::io(format!("flush {}", self.path.display()), e))?;
        let written = self
            .file
            .metadata()
            .map_err(|e| HaulerError::io(format!("stat {}", self.path.display()), e))?
            .len();
        let Self { file, path, progress } = *self;
        drop(file);

        progress.verify(written, size, expected)?;
        tracing::debug!(
            path = %path.display(),
            digest = %progress.digest(),
            size = written,
            "Committed blob"
        );
        Ok(())
    }
}

/// Hashes and drops the bytes, verifying them on commit.
pub struct DiscardWriter {
    progress: Progress,
}

impl DiscardWriter {
    pub(crate) fn new(progress: Progress) -> Self {
        Self { progress }
    }
}

impl Write for DiscardWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.progress.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentWriter for DiscardWriter {
    fn digest(&self) -> Digest {
        self.progress.digest()
    }

    fn status(&self) -> Status {
        self.progress.status()
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if size != 0 {
            return Err(unsupported_truncate(size));
        }
        self.progress.reset();
        Ok(())
    }

    fn commit(self: Box<Self>, size: Option<u64>, expected: Option<&Digest>) -> Result<()> {
        self.progress.verify(self.progress.offset, size, expected)
    }
}
