//! Content digests.
//!
//! Every blob is identified by the SHA-256 of its bytes, written in the
//! `sha256:<lowercase hex>` form registries use.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use hauler_core::error::{HaulerError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

/// Hash algorithm of a [`Digest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    Sha256,
}

impl Algorithm {
    /// Name used in the digest prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
        }
    }

    fn hex_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
        }
    }
}

/// A content digest (`sha256:<hex>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    /// SHA-256 of a byte slice.
    pub fn sha256(data: &[u8]) -> Self {
        let mut digester = Digester::new();
        digester.update(data);
        digester.finish()
    }

    /// SHA-256 of everything readable from `reader`, along with the byte count.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<(Self, u64)> {
        let mut digester = Digester::new();
        let size = io::copy(&mut reader, &mut digester)?;
        Ok((digester.finish(), size))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Lowercase hex of the hash, without the algorithm prefix.
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.hex)
    }
}

impl FromStr for Digest {
    type Err = HaulerError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| HaulerError::InvalidDigest(format!("missing algorithm in '{}'", s)))?;

        let algorithm = match algorithm {
            "sha256" => Algorithm::Sha256,
            other => {
                return Err(HaulerError::InvalidDigest(format!(
                    "unsupported algorithm '{}' in '{}'",
                    other, s
                )))
            }
        };

        let valid = hex.len() == algorithm.hex_len()
            && hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !valid {
            return Err(HaulerError::InvalidDigest(format!(
                "expected {} lowercase hex characters in '{}'",
                algorithm.hex_len(),
                s
            )));
        }

        Ok(Digest {
            algorithm,
            hex: hex.to_string(),
        })
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-256 hasher usable as an [`io::Write`] sink.
#[derive(Clone, Default)]
pub struct Digester {
    hasher: Sha256,
}

impl Digester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Digest of everything written so far.
    pub fn digest(&self) -> Digest {
        self.clone().finish()
    }

    pub fn finish(self) -> Digest {
        Digest {
            algorithm: Algorithm::Sha256,
            hex: hex::encode(self.hasher.finalize()),
        }
    }
}

impl Write for Digester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_sha256_bytes() {
        assert_eq!(Digest::sha256(b"hello").to_string(), HELLO);
    }

    #[test]
    fn test_from_reader_counts_bytes() {
        let (digest, size) = Digest::from_reader(&b"hello"[..]).unwrap();
        assert_eq!(digest.to_string(), HELLO);
        assert_eq!(size, 5);
    }

    #[test]
    fn test_parse() {
        let digest: Digest = HELLO.parse().unwrap();
        assert_eq!(digest.algorithm(), Algorithm::Sha256);
        assert_eq!(digest.hex().len(), 64);
        assert_eq!(digest, Digest::sha256(b"hello"));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("2cf24dba".parse::<Digest>().is_err());
        assert!("md5:2cf24dba".parse::<Digest>().is_err());
        assert!("sha256:abc".parse::<Digest>().is_err());
        assert!(HELLO.to_uppercase().replace("SHA256", "sha256").parse::<Digest>().is_err());
    }

    #[test]
    fn test_digester_incremental() {
        let mut digester = Digester::new();
        digester.write_all(b"hel").unwrap();
        digester.write_all(b"lo").unwrap();
        assert_eq!(digester.digest().to_string(), HELLO);
        assert_eq!(digester.finish().to_string(), HELLO);
    }

    #[test]
    fn test_serde_as_string() {
        let digest = Digest::sha256(b"hello");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", HELLO));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);
    }
}
