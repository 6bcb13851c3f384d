//! Content hash algorithms computed while blobs are written.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::BlobStoreError;

/// A hash algorithm the blob store can compute over blob content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// The algorithms every stored artifact is hashed with.
    pub const REQUIRED: [HashAlgorithm; 2] = [HashAlgorithm::Sha1, HashAlgorithm::Md5];

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// File suffix of a checksum file carrying this hash, e.g. `.sha1`.
    pub fn extension(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => ".sha1",
            HashAlgorithm::Md5 => ".md5",
            HashAlgorithm::Sha256 => ".sha256",
        }
    }

    /// Length of the lowercase hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = BlobStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            _ => Err(BlobStoreError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Computes several digests over the same content in a single pass.
#[derive(Default)]
pub struct MultiHasher {
    sha1: Option<Sha1>,
    md5: Option<Md5>,
    sha256: Option<Sha256>,
}

impl MultiHasher {
    pub fn new(algorithms: &[HashAlgorithm]) -> Self {
        let mut hasher = Self::default();
        for algorithm in algorithms {
            match algorithm {
                HashAlgorithm::Sha1 => hasher.sha1 = Some(Sha1::new()),
                HashAlgorithm::Md5 => hasher.md5 = Some(Md5::new()),
                HashAlgorithm::Sha256 => hasher.sha256 = Some(Sha256::new()),
            }
        }
        hasher
    }

    pub fn update(&mut self, data: &[u8]) {
        if let Some(h) = self.sha1.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.md5.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha256.as_mut() {
            h.update(data);
        }
    }

    /// Consume the hasher, returning lowercase hex digests keyed by algorithm.
    pub fn finish(self) -> BTreeMap<HashAlgorithm, String> {
        let mut digests = BTreeMap::new();
        if let Some(h) = self.sha1 {
            digests.insert(HashAlgorithm::Sha1, hex::encode(h.finalize()));
        }
        if let Some(h) = self.md5 {
            digests.insert(HashAlgorithm::Md5, hex::encode(h.finalize()));
        }
        if let Some(h) = self.sha256 {
            digests.insert(HashAlgorithm::Sha256, hex::encode(h.finalize()));
        }
        digests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let mut hasher = MultiHasher::new(&HashAlgorithm::REQUIRED);
        hasher.update(b"hello ");
        hasher.update(b"world");
        let digests = hasher.finish();

        assert_eq!(digests.len(), 2);
        assert_eq!(
            digests[&HashAlgorithm::Sha1],
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(
            digests[&HashAlgorithm::Md5],
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("SHA1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert!("crc32".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::Md5.extension(), ".md5");
    }
}
