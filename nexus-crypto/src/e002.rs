//! E002 hybrid encryption: AES-128-CBC bulk cipher wrapped with RSA-OAEP
//! key transport (spec.md §4.1).

use aes::Aes128;
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;

const AES_KEY_LEN: usize = 16;
const ZERO_IV: [u8; 16] = [0u8; 16];

/// The AES-128 transaction key plus its RSA-OAEP wrapping, as exchanged at
/// the start of an EBICS upload or download transaction.
pub struct WrappedKey {
    pub ciphertext: Vec<u8>,
    pub wrapped_key: Vec<u8>,
}

/// Encrypts `plaintext` with a freshly generated AES-128 key (zero IV,
/// PKCS#7 padding) and wraps that key with the bank's RSA-OAEP public
/// encryption key.
pub fn encrypt_e002(plaintext: &[u8], bank_encryption_key: &RsaPublicKey) -> Result<WrappedKey, CryptoError> {
    let mut aes_key = [0u8; AES_KEY_LEN];
    OsRng.fill_bytes(&mut aes_key);

    let ciphertext = aes_cbc_encrypt(plaintext, &aes_key);
    let wrapped_key = bank_encryption_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &aes_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    Ok(WrappedKey { ciphertext, wrapped_key })
}

/// Unwraps the AES key with the subscriber's RSA private encryption key and
/// decrypts the bulk ciphertext.
pub fn decrypt_e002(
    ciphertext: &[u8],
    wrapped_key: &[u8],
    subscriber_encryption_key: &RsaPrivateKey,
) -> Result<Vec<u8>, CryptoError> {
    let aes_key = subscriber_encryption_key
        .decrypt(Oaep::new::<Sha256>(), wrapped_key)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    if aes_key.len() != AES_KEY_LEN {
        return Err(CryptoError::DecryptionFailed(
            "unwrapped transaction key has the wrong length".into(),
        ));
    }
    aes_cbc_decrypt(ciphertext, &aes_key)
}

fn aes_cbc_encrypt(plaintext: &[u8], key: &[u8; AES_KEY_LEN]) -> Vec<u8> {
    Encryptor::<Aes128>::new(key.into(), &ZERO_IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

fn aes_cbc_decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key: [u8; AES_KEY_LEN] = key
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed("transaction key must be 16 bytes".into()))?;
    Decryptor::<Aes128>::new(&key.into(), &ZERO_IV.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::rsa_generate;

    #[test]
    fn round_trips_through_hybrid_encryption() {
        let subscriber_key = rsa_generate(2048).unwrap();
        let public = subscriber_key.to_public_key();
        let plaintext = b"pain.001 order data goes here, padded or not";

        let wrapped = encrypt_e002(plaintext, &public).unwrap();
        let recovered = decrypt_e002(&wrapped.ciphertext, &wrapped.wrapped_key, &subscriber_key).unwrap();

        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn rejects_tampered_wrapped_key() {
        let subscriber_key = rsa_generate(2048).unwrap();
        let public = subscriber_key.to_public_key();
        let mut wrapped = encrypt_e002(b"hello", &public).unwrap();
        if let Some(byte) = wrapped.wrapped_key.first_mut() {
            *byte ^= 0xFF;
        }
        assert!(decrypt_e002(&wrapped.ciphertext, &wrapped.wrapped_key, &subscriber_key).is_err());
    }
}
