//! Error taxonomy for cryptographic operations (see spec.md §4.1).

use thiserror::Error;

/// Errors raised by [`crate`] operations.
///
/// Every variant here is fatal for the operation that raised it; callers
/// that want to retry (e.g. a transient network error) are expected to be
/// several layers up the stack, not here.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Malformed DER, or RSA component sizes the protocol does not accept.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// AES-CBC padding or RSA-OAEP unwrap failed.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// A signature did not verify against the supplied public key.
    #[error("signature verification failed")]
    VerificationFailed,

    /// A Base32-Crockford string contained a character outside the alphabet.
    #[error("invalid base32-crockford character: {0:?}")]
    InvalidCrockfordChar(char),
}
