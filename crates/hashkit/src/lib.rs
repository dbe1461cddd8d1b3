#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `hashkit` collects the non-cryptographic hash functions the proxy's
//! distributor uses to turn a routing key into a bucket index: the FNV
//! family, CRC-16/CRC-32, MurmurHash2, Jenkins's one-at-a-time hash and its
//! harder-mixing sibling, SuperFastHash, and MD5 (used both as a selectable
//! hash and as the ketama ring-point generator).
//!
//! # Design
//!
//! [`HashAlgorithm`] is the single selection surface: it mirrors the
//! `hash` field accepted by the proxy's configuration object
//! (`fnv1_32`, `fnv1a_32`, `fnv1_64`, `fnv1a_64`, `crc16`, `crc32`,
//! `crc32a`, `hsieh`, `jenkins`, `md5`, `murmur`, `one_at_a_time`) and
//! [`HashAlgorithm::hash`] dispatches to the matching function, always
//! returning a `u32` so the distributor never needs to special-case the
//! algorithm's native width.
//!
//! # Invariants
//!
//! - Every algorithm is a pure function of its input bytes: the same key
//!   always hashes to the same value within a process and across processes,
//!   which is required for independent proxy instances to agree on routing.
//! - [`HashAlgorithm::hash`] never panics, regardless of input length.

mod crc;
mod fnv;
mod hsieh;
mod jenkins;
mod md5sum;
mod murmur;

pub use crc::{crc16, crc32, crc32a};
pub use fnv::{fnv1_32, fnv1_64, fnv1a_32, fnv1a_64};
pub use hsieh::hsieh;
pub use jenkins::{jenkins, one_at_a_time};
pub use md5sum::{digest as md5_digest, digest_words as md5_digest_words, md5_32};
pub use murmur::{murmur2_32, murmur2_64};

/// A selectable distributor hash, as configured on a server pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum HashAlgorithm {
    /// FNV-1, 32-bit.
    Fnv1_32,
    /// FNV-1a, 32-bit. The proxy's overall default.
    Fnv1a_32,
    /// FNV-1, 64-bit, folded to 32 bits.
    Fnv1_64,
    /// FNV-1a, 64-bit, folded to 32 bits.
    Fnv1a_64,
    /// CRC-16/CCITT-FALSE.
    Crc16,
    /// Raw CRC-32 (IEEE 802.3).
    Crc32,
    /// libmemcached-compatible CRC-32 folded to 15 bits.
    Crc32a,
    /// Paul Hsieh's SuperFastHash.
    Hsieh,
    /// Bob Jenkins's hardened one-at-a-time variant.
    Jenkins,
    /// MD5, folded to 32 bits.
    Md5,
    /// MurmurHash2, 32-bit.
    Murmur,
    /// The original one-at-a-time hash.
    OneAtATime,
}

impl HashAlgorithm {
    /// Parses the configuration file's textual hash name.
    ///
    /// Returns `None` for anything other than the twelve names the proxy's
    /// configuration grammar accepts.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "fnv1_32" => Self::Fnv1_32,
            "fnv1a_32" => Self::Fnv1a_32,
            "fnv1_64" => Self::Fnv1_64,
            "fnv1a_64" => Self::Fnv1a_64,
            "crc16" => Self::Crc16,
            "crc32" => Self::Crc32,
            "crc32a" => Self::Crc32a,
            "hsieh" => Self::Hsieh,
            "jenkins" => Self::Jenkins,
            "md5" => Self::Md5,
            "murmur" => Self::Murmur,
            "one_at_a_time" => Self::OneAtATime,
            _ => return None,
        })
    }

    /// Hashes `key`, always returning a 32-bit value regardless of the
    /// algorithm's native word size.
    #[must_use]
    pub fn hash(self, key: &[u8]) -> u32 {
        match self {
            Self::Fnv1_32 => fnv1_32(key),
            Self::Fnv1a_32 => fnv1a_32(key),
            Self::Fnv1_64 => fnv1_64(key) as u32,
            Self::Fnv1a_64 => fnv1a_64(key) as u32,
            Self::Crc16 => u32::from(crc16(key)),
            Self::Crc32 => crc32(key),
            Self::Crc32a => crc32a(key),
            Self::Hsieh => hsieh(key),
            Self::Jenkins => jenkins(key),
            Self::Md5 => md5_32(key),
            Self::Murmur => murmur2_32(key),
            Self::OneAtATime => one_at_a_time(key),
        }
    }
}

impl Default for HashAlgorithm {
    /// `fnv1a_32` is the proxy's configuration default.
    fn default() -> Self {
        Self::Fnv1a_32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_variant_name() {
        let names = [
            "fnv1_32",
            "fnv1a_32",
            "fnv1_64",
            "fnv1a_64",
            "crc16",
            "crc32",
            "crc32a",
            "hsieh",
            "jenkins",
            "md5",
            "murmur",
            "one_at_a_time",
        ];
        for name in names {
            assert!(HashAlgorithm::parse(name).is_some(), "failed to parse {name}");
        }
    }

    #[test]
    fn parse_rejects_unknown_name() {
        assert!(HashAlgorithm::parse("sha256").is_none());
    }

    #[test]
    fn hash_is_stable_for_same_algorithm_and_key() {
        let algo = HashAlgorithm::Fnv1a_32;
        assert_eq!(algo.hash(b"foo"), algo.hash(b"foo"));
    }

    #[test]
    fn default_is_fnv1a_32() {
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Fnv1a_32);
    }
}
