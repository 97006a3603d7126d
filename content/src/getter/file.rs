//! Regular files on the local filesystem.

use std::fs::File;

use hauler_core::error::{HaulerError, Result};
use tokio_util::sync::CancellationToken;

use super::{source_config, Cancellable, Getter, GetterKind, SourceUrl};
use crate::config::Config;
use crate::consts;
use crate::layer::ReadStream;

/// Serves sources naming an existing regular file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileGetter;

impl Getter for FileGetter {
    fn kind(&self) -> GetterKind {
        GetterKind::File
    }

    fn detect(&self, source: &SourceUrl) -> bool {
        source
            .local_path()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    fn name(&self, source: &SourceUrl) -> Result<String> {
        let path = source.local_path().ok_or_else(|| HaulerError::SourceNotFound {
            source_ref: source.as_str().to_string(),
        })?;
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| HaulerError::Parse(format!("no file name in '{}'", source.as_str())))
    }

    fn open(&self, cancel: &CancellationToken, source: &SourceUrl) -> Result<ReadStream> {
        if cancel.is_cancelled() {
            return Err(HaulerError::Cancelled);
        }
        let path = source.local_path().ok_or_else(|| HaulerError::SourceNotFound {
            source_ref: source.as_str().to_string(),
        })?;
        let file = File::open(&path)
            .map_err(|e| HaulerError::io(format!("open {}", path.display()), e))?;
        Ok(Box::new(Cancellable::new(file, cancel.clone())))
    }

    fn config(&self, source: &SourceUrl) -> Result<Config> {
        source_config(source, consts::FILE_LOCAL_CONFIG_MEDIA_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_detect_only_regular_files() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "a").unwrap();

        let getter = FileGetter;
        assert!(getter.detect(&SourceUrl::parse(path.to_str().unwrap()).unwrap()));
        assert!(!getter.detect(&SourceUrl::parse(tmp.path().to_str().unwrap()).unwrap()));
        assert!(!getter.detect(&SourceUrl::parse("missing.txt").unwrap()));
    }

    #[test]
    fn test_name_is_base_filename() {
        let source = SourceUrl::parse("/some/where/chart-1.0.0.tgz").unwrap();
        assert_eq!(FileGetter.name(&source).unwrap(), "chart-1.0.0.tgz");
    }

    #[test]
    fn test_open_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "contents").unwrap();

        let source = SourceUrl::parse(path.to_str().unwrap()).unwrap();
        let mut reader = FileGetter.open(&CancellationToken::new(), &source).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "contents");
    }

    #[test]
    fn test_config_carries_reference() {
        let source = SourceUrl::parse("file://dir/a.txt").unwrap();
        let config = FileGetter.config(&source).unwrap();
        assert_eq!(config.media_type(), consts::FILE_LOCAL_CONFIG_MEDIA_TYPE);
        assert_eq!(config.raw(), br#"{"reference":"file://dir/a.txt"}"#);
    }
}
