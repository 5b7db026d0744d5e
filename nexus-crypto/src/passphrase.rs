//! Passphrase-based protection for private key material at rest
//! (spec.md §4.1). A random salt and IV are stored alongside the
//! ciphertext so the same passphrase can derive the same key deterministically
//! on reload while every encryption still looks random on disk.

use aes::Aes128;
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::CryptoError;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const KEY_LEN: usize = 16;
const PBKDF2_ROUNDS: u32 = 210_000;

/// An encrypted blob together with the salt and IV needed to decrypt it.
pub struct EncryptedBlob {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::<Hmac<Sha256>>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key)
        .expect("PBKDF2 output length is fixed and always valid");
    key
}

/// Encrypts `blob` under a key derived from `passphrase`.
pub fn passphrase_encrypt(blob: &[u8], passphrase: &str) -> EncryptedBlob {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let key = derive_key(passphrase, &salt);
    let ciphertext = Encryptor::<Aes128>::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(blob);

    EncryptedBlob { salt, iv, ciphertext }
}

/// Decrypts a blob produced by [`passphrase_encrypt`].
pub fn passphrase_decrypt(blob: &EncryptedBlob, passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    let key = derive_key(passphrase, &blob.salt);
    Decryptor::<Aes128>::new(&key.into(), &blob.iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&blob.ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_correct_passphrase() {
        let blob = passphrase_encrypt(b"top secret RSA key DER bytes", "correct horse battery staple");
        let recovered = passphrase_decrypt(&blob, "correct horse battery staple").unwrap();
        assert_eq!(recovered, b"top secret RSA key DER bytes");
    }

    #[test]
    fn rejects_wrong_passphrase() {
        let blob = passphrase_encrypt(b"top secret", "right passphrase");
        assert!(passphrase_decrypt(&blob, "wrong passphrase").is_err());
    }
}
