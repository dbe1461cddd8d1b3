//! MD5 digest helpers.
//!
//! MD5 serves two roles in this crate: as a selectable `md5` distributor
//! hash (folded to 32 bits) and as the ring-point generator for ketama
//! continuum construction, which needs the full 16-byte digest split into
//! four little-endian 32-bit words.

use md5::{Digest, Md5};

/// Full 16-byte MD5 digest of `data`.
#[must_use]
pub fn digest(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// MD5-based hash folded to 32 bits, matching libmemcached's `hash_md5`:
/// the first four bytes of the digest, read little-endian.
#[must_use]
pub fn md5_32(data: &[u8]) -> u32 {
    let digest = digest(data);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Splits a 16-byte MD5 digest into four little-endian 32-bit words, as
/// consumed by the ketama continuum builder (one ring point per word).
#[must_use]
pub fn digest_words(data: &[u8]) -> [u32; 4] {
    let digest = digest(data);
    [
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]),
        u32::from_le_bytes([digest[4], digest[5], digest[6], digest[7]]),
        u32::from_le_bytes([digest[8], digest[9], digest[10], digest[11]]),
        u32::from_le_bytes([digest[12], digest[13], digest[14], digest[15]]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_vector() {
        // MD5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(
            digest(b""),
            [
                0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec,
                0xf8, 0x42, 0x7e,
            ]
        );
    }

    #[test]
    fn digest_words_round_trips_digest_bytes() {
        let words = digest_words(b"server-1");
        let raw = digest(b"server-1");
        assert_eq!(words[0], u32::from_le_bytes(raw[0..4].try_into().unwrap()));
        assert_eq!(
            words[3],
            u32::from_le_bytes(raw[12..16].try_into().unwrap())
        );
    }
}
