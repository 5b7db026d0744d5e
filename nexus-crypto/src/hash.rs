//! EBICS public-key hash (spec.md §4.1).
//!
//! The bank-facing "key letter" hash is SHA-256 over the ASCII string
//! `<spaced-hex exponent> <spaced-hex modulus>`, where each component is
//! rendered as its minimal big-endian byte representation (no leading zero
//! byte), uppercase-hex-encoded, with a single space between each byte pair.

use sha2::{Digest, Sha256};

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    &bytes[first_nonzero..]
}

fn spaced_hex(bytes: &[u8]) -> String {
    strip_leading_zeros(bytes)
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Computes the 32-byte EBICS public-key hash used to render key letters
/// and to compare bank-delivered HPB keys against their advertised hash.
pub fn ebics_public_hash(exponent: &[u8], modulus: &[u8]) -> [u8; 32] {
    let input = format!("{} {}", spaced_hex(exponent), spaced_hex(modulus));
    let digest = Sha256::digest(input.as_bytes());
    digest.into()
}
