//! RSA key generation, loading, and component access (spec.md §4.1).

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use crate::error::CryptoError;

/// Generates a fresh RSA private key. EBICS subscribers use 2048-bit keys.
pub fn rsa_generate(bits: usize) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Loads a PKCS#1 DER-encoded RSA private key.
pub fn rsa_load_private(der: &[u8]) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs1_der(der).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Loads a PKCS#1 DER-encoded RSA public key.
pub fn rsa_load_public(der: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_pkcs1_der(der).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Builds a public key from its raw big-endian modulus and exponent, as
/// delivered inside an HPB order-data block.
pub fn rsa_public_from_components(modulus: &[u8], exponent: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    let n = BigUint::from_bytes_be(modulus);
    let e = BigUint::from_bytes_be(exponent);
    RsaPublicKey::new(n, e).map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Encodes a private key as PKCS#1 DER, ready for Base32-Crockford wrapping.
pub fn private_to_der(key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    key.to_pkcs1_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Encodes a public key as PKCS#1 DER, ready for Base32-Crockford wrapping.
pub fn public_to_der(key: &RsaPublicKey) -> Result<Vec<u8>, CryptoError> {
    key.to_pkcs1_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

/// Raw big-endian modulus bytes, as consumed by [`crate::hash::ebics_public_hash`].
pub fn modulus_bytes(key: &RsaPublicKey) -> Vec<u8> {
    key.n().to_bytes_be()
}

/// Raw big-endian public exponent bytes, as consumed by [`crate::hash::ebics_public_hash`].
pub fn exponent_bytes(key: &RsaPublicKey) -> Vec<u8> {
    key.e().to_bytes_be()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_round_trips_through_der() {
        let key = rsa_generate(2048).unwrap();
        let der = private_to_der(&key).unwrap();
        let reloaded = rsa_load_private(&der).unwrap();
        assert_eq!(key.to_public_key().n(), reloaded.to_public_key().n());
    }

    #[test]
    fn public_key_from_components_matches_generated_key() {
        let key = rsa_generate(2048).unwrap();
        let public = key.to_public_key();
        let rebuilt =
            rsa_public_from_components(&modulus_bytes(&public), &exponent_bytes(&public)).unwrap();
        assert_eq!(public.n(), rebuilt.n());
        assert_eq!(public.e(), rebuilt.e());
    }
}
