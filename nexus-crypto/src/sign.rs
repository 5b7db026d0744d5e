//! Two distinct RSA signature schemes are used on the wire:
//!
//! - **A006** (RSASSA-PSS / SHA-256): signs *order data* with the
//!   subscriber's signature key — INI's self-signed key submission, and
//!   the business-level ES over pain.001 order data.
//! - **rsa-sha256** (RSASSA-PKCS1-v1_5 / SHA-256, the
//!   `http://www.w3.org/2001/04/xmldsig-more#rsa-sha256` XML-DSIG
//!   algorithm): signs the *transport envelope* (`AuthSignature`) with the
//!   subscriber's authentication key. These must not be confused with each
//!   other; spec.md §4.1 names A006 but §4.2's enveloped signature is the
//!   XML-DSIG one.

use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature as Pkcs1v15Signature, SigningKey as Pkcs1v15SigningKey, VerifyingKey as Pkcs1v15VerifyingKey};
use rsa::pss::{BlindedSigningKey, Signature as PssSignature, VerifyingKey as PssVerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::CryptoError;

/// Signs `data` with the A006 (RSA-PSS/SHA-256) scheme.
pub fn sign_a006(data: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    let signing_key = BlindedSigningKey::<Sha256>::new(key.clone());
    let signature = signing_key
        .try_sign_with_rng(&mut OsRng, data)
        .map_err(|e| CryptoError::InvalidKey(format!("A006 signing failed: {e}")))?;
    Ok(signature.to_vec())
}

/// Verifies an A006 signature against `data`.
pub fn verify_a006(data: &[u8], signature: &[u8], key: &RsaPublicKey) -> Result<(), CryptoError> {
    let verifying_key = PssVerifyingKey::<Sha256>::new(key.clone());
    let signature = PssSignature::try_from(signature).map_err(|_| CryptoError::VerificationFailed)?;
    verifying_key
        .verify(data, &signature)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Signs `data` with RSASSA-PKCS1-v1_5/SHA-256, the algorithm the
/// enveloped XML-DSIG `AuthSignature` uses over the canonicalized,
/// authenticated node set.
pub fn sign_xmldsig_rsa_sha256(data: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>, CryptoError> {
    let signing_key = Pkcs1v15SigningKey::<Sha256>::new(key.clone());
    let signature = signing_key.try_sign(data).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    Ok(signature.to_vec())
}

/// Verifies an XML-DSIG `rsa-sha256` signature.
pub fn verify_xmldsig_rsa_sha256(data: &[u8], signature: &[u8], key: &RsaPublicKey) -> Result<(), CryptoError> {
    let verifying_key = Pkcs1v15VerifyingKey::<Sha256>::new(key.clone());
    let signature = Pkcs1v15Signature::try_from(signature).map_err(|_| CryptoError::VerificationFailed)?;
    verifying_key
        .verify(data, &signature)
        .map_err(|_| CryptoError::VerificationFailed)
}
