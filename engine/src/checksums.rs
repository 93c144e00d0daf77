//! Content digests.
//!
//! Fingerprints for mapped file contents:
//! - CRC32, MD5, SHA-256 and BLAKE3
//! - one-shot hashing of a byte slice, so a mapped view is hashed in place
//!   without copying it into a buffer

use crate::content::MappedContent;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// CRC32 (fast, 32-bit)
    Crc32,
    /// MD5 (legacy)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crc32 => write!(f, "crc32"),
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crc32" => Ok(Self::Crc32),
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(format!(
                "unknown checksum algorithm '{}' (expected crc32, md5, sha256 or blake3)",
                s
            )),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Lowercase hex digest
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Format as "algo:hex"
    pub fn to_string_with_algo(&self) -> String {
        format!("{}:{}", self.algorithm, self.hex)
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

impl Serialize for ChecksumValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_with_algo())
    }
}

const CRC32_TABLE: [u32; 256] = crc32_table();

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ 0xedb8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

fn crc32(data: &[u8]) -> u32 {
    let crc = data.iter().fold(0xffff_ffffu32, |crc, &byte| {
        CRC32_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8)
    });
    crc ^ 0xffff_ffff
}

/// Digest a byte slice.
pub fn checksum_bytes(data: &[u8], algorithm: ChecksumAlgorithm) -> ChecksumValue {
    let hex = match algorithm {
        ChecksumAlgorithm::Crc32 => format!("{:08x}", crc32(data)),
        ChecksumAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
        ChecksumAlgorithm::Sha256 => {
            use sha2::Digest;
            format!("{:x}", sha2::Sha256::digest(data))
        }
        ChecksumAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
    };
    ChecksumValue::new(algorithm, hex)
}

/// Digest a mapped view in place.
pub fn checksum_content(content: &MappedContent, algorithm: ChecksumAlgorithm) -> ChecksumValue {
    checksum_bytes(content.as_bytes(), algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_display() {
        assert_eq!(ChecksumAlgorithm::Crc32.to_string(), "crc32");
        assert_eq!(ChecksumAlgorithm::Md5.to_string(), "md5");
        assert_eq!(ChecksumAlgorithm::Sha256.to_string(), "sha256");
        assert_eq!(ChecksumAlgorithm::Blake3.to_string(), "blake3");
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("crc32".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Crc32));
        assert_eq!("MD5".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Md5));
        assert_eq!("sha256".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Sha256));
        assert_eq!("blake3".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Blake3));
        assert!("invalid".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(checksum_bytes(b"hello", ChecksumAlgorithm::Crc32).hex(), "3610a686");
        assert_eq!(
            checksum_bytes(b"hello", ChecksumAlgorithm::Md5).hex(),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            checksum_bytes(b"hello", ChecksumAlgorithm::Sha256).hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        let blake = checksum_bytes(b"hello", ChecksumAlgorithm::Blake3);
        assert_eq!(blake.algorithm(), ChecksumAlgorithm::Blake3);
        assert_eq!(blake.hex().len(), 64);
    }

    #[test]
    fn test_checksum_value_display() {
        let cs = ChecksumValue::new(ChecksumAlgorithm::Sha256, "abc123".to_string());
        assert_eq!(cs.to_string(), "abc123");
        assert_eq!(cs.to_string_with_algo(), "sha256:abc123");
    }

    #[test]
    fn test_checksum_mapped_content() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").expect("Failed to write file");

        let view = crate::content::map_path(&path).expect("Failed to map file");
        assert_eq!(
            checksum_content(&view, ChecksumAlgorithm::Md5),
            checksum_bytes(b"hello", ChecksumAlgorithm::Md5)
        );
    }
}
