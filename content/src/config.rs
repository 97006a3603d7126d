//! OCI config blobs wrapping arbitrary serializable values.

use hauler_core::error::Result;
use serde::Serialize;

use crate::consts;
use crate::digest::Digest;
use crate::manifest::Descriptor;

/// Options for [`to_config`].
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    media_type: String,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            media_type: consts::UNKNOWN_MANIFEST.to_string(),
        }
    }
}

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }
}

/// A config blob: JSON bytes plus the media type they are published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    raw: Vec<u8>,
    media_type: String,
}

/// Wrap `value` as a config blob.
///
/// Encoding is deterministic for structs (field order) and for
/// `serde_json::Value` maps (sorted keys).
pub fn to_config<T: Serialize + ?Sized>(value: &T, opts: ConfigOptions) -> Result<Config> {
    Ok(Config {
        raw: serde_json::to_vec(value)?,
        media_type: opts.media_type,
    })
}

impl Config {
    /// Use already-encoded bytes as the config blob.
    pub fn from_raw(raw: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            media_type: media_type.into(),
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn digest(&self) -> Digest {
        Digest::sha256(&self.raw)
    }

    pub fn size(&self) -> u64 {
        self.raw.len() as u64
    }

    pub fn descriptor(&self) -> Descriptor {
        Descriptor::new(self.media_type.clone(), self.digest(), self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        reference: String,
        count: u32,
    }

    #[test]
    fn test_to_config_defaults() {
        let config = to_config(
            &Sample {
                reference: "file.txt".to_string(),
                count: 1,
            },
            ConfigOptions::new(),
        )
        .unwrap();

        assert_eq!(config.raw(), br#"{"reference":"file.txt","count":1}"#);
        assert_eq!(config.media_type(), consts::UNKNOWN_MANIFEST);
        assert_eq!(config.size(), config.raw().len() as u64);
        assert_eq!(config.digest(), Digest::sha256(config.raw()));
    }

    #[test]
    fn test_to_config_is_deterministic() {
        let value = serde_json::json!({"b": 1, "a": [1, 2], "c": {"z": true, "y": null}});
        let first = to_config(&value, ConfigOptions::new()).unwrap();
        let second = to_config(&value, ConfigOptions::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.raw(), br#"{"a":[1,2],"b":1,"c":{"y":null,"z":true}}"#);
    }

    #[test]
    fn test_descriptor_uses_media_type_option() {
        let config = to_config(
            &serde_json::json!({}),
            ConfigOptions::new().media_type(consts::MEMORY_CONFIG_MEDIA_TYPE),
        )
        .unwrap();
        let desc = config.descriptor();
        assert_eq!(desc.media_type, consts::MEMORY_CONFIG_MEDIA_TYPE);
        assert_eq!(desc.size, 2);
        assert_eq!(desc.digest, Digest::sha256(b"{}"));
    }
}
