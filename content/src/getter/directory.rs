//! Local directory trees, archived as gzipped tarballs.
//!
//! Archives are written to an anonymous temp file on every `open`, so the
//! stream stays restartable and the file disappears once the reader drops.
//! Entries are walked in sorted order and ownership is cleared so two
//! archives of the same tree are byte identical.

use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use hauler_core::error::{HaulerError, Result};
use tokio_util::sync::CancellationToken;

use super::{source_config, Cancellable, Getter, GetterKind, SourceUrl};
use crate::config::Config;
use crate::consts;
use crate::layer::ReadStream;

/// Serves sources naming an existing directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryGetter;

impl Getter for DirectoryGetter {
    fn kind(&self) -> GetterKind {
        GetterKind::Directory
    }

    fn detect(&self, source: &SourceUrl) -> bool {
        source
            .local_path()
            .and_then(|p| fs::metadata(p).ok())
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    fn name(&self, source: &SourceUrl) -> Result<String> {
        let path = source.local_path().ok_or_else(|| HaulerError::SourceNotFound {
            source_ref: source.as_str().to_string(),
        })?;

        // "." and friends have no file name until resolved
        let name = match path.file_name() {
            Some(name) => Some(name.to_os_string()),
            None => fs::canonicalize(&path)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_os_string())),
        };

        name.map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| HaulerError::Parse(format!("no directory name in '{}'", source.as_str())))
    }

    fn open(&self, cancel: &CancellationToken, source: &SourceUrl) -> Result<ReadStream> {
        let prefix = self.name(source)?;
        self.open_as(cancel, source, &prefix)
    }

    fn open_as(
        &self,
        cancel: &CancellationToken,
        source: &SourceUrl,
        prefix: &str,
    ) -> Result<ReadStream> {
        let dir = source.local_path().ok_or_else(|| HaulerError::SourceNotFound {
            source_ref: source.as_str().to_string(),
        })?;

        let mut archive = tempfile::tempfile()
            .map_err(|e| HaulerError::io("create temporary archive", e))?;
        write_archive(&mut archive, cancel, &dir, prefix)?;
        archive
            .seek(SeekFrom::Start(0))
            .map_err(|e| HaulerError::io("rewind temporary archive", e))?;

        tracing::debug!(dir = %dir.display(), prefix = %prefix, "Archived directory");

        Ok(Box::new(Cancellable::new(archive, cancel.clone())))
    }

    fn config(&self, source: &SourceUrl) -> Result<Config> {
        source_config(source, consts::FILE_DIRECTORY_CONFIG_MEDIA_TYPE)
    }
}

/// Write `dir` as a gzipped tar whose entries live under `prefix/`.
fn write_archive<W: Write>(
    out: W,
    cancel: &CancellationToken,
    dir: &Path,
    prefix: &str,
) -> Result<()> {
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    add_dir_to_tar(&mut builder, cancel, dir, prefix)?;

    let encoder = builder
        .into_inner()
        .map_err(|e| HaulerError::io("finalize archive", e))?;
    encoder
        .finish()
        .map_err(|e| HaulerError::io("finalize archive", e))?;
    Ok(())
}

/// Recursively add a directory's files to a tar builder.
fn add_dir_to_tar<W: Write>(
    builder: &mut tar::Builder<W>,
    cancel: &CancellationToken,
    current: &Path,
    tar_prefix: &str,
) -> Result<()> {
    let mut entries = fs::read_dir(current)
        .map_err(|e| HaulerError::io(format!("read directory {}", current.display()), e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| HaulerError::io(format!("read directory {}", current.display()), e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if cancel.is_cancelled() {
            return Err(HaulerError::Cancelled);
        }

        let path = entry.path();
        let tar_path = format!("{}/{}", tar_prefix, entry.file_name().to_string_lossy());
        let metadata = fs::symlink_metadata(&path)
            .map_err(|e| HaulerError::io(format!("stat {}", path.display()), e))?;

        if metadata.is_dir() {
            add_dir_to_tar(builder, cancel, &path, &tar_path)?;
            continue;
        }

        let mut header = tar::Header::new_gnu();
        header.set_metadata(&metadata);
        header.set_uid(0);
        header.set_gid(0);
        header
            .set_username("")
            .and_then(|_| header.set_groupname(""))
            .map_err(|e| HaulerError::io(format!("tar header for {}", path.display()), e))?;

        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&path)
                .map_err(|e| HaulerError::io(format!("read link {}", path.display()), e))?;
            header.set_size(0);
            builder
                .append_link(&mut header, &tar_path, &target)
                .map_err(|e| HaulerError::io(format!("archive {}", path.display()), e))?;
        } else if metadata.is_file() {
            let file = File::open(&path)
                .map_err(|e| HaulerError::io(format!("open {}", path.display()), e))?;
            builder
                .append_data(&mut header, &tar_path, file)
                .map_err(|e| HaulerError::io(format!("archive {}", path.display()), e))?;
        }
    }

    Ok(())
}
