//! Error classification for the EBICS transport and key-management layers
//! (spec.md §4.5 "Error classification", §7 "ebics-reachability" /
//! "ebics-permanent"). Every negative outcome a bank or the network can
//! produce collapses into exactly one of these variants; callers branch on
//! the variant, never on a return-code string, to decide retry policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EbicsSideError {
    /// Connection refused, TLS failure, or a 5xx from the bank. Transient:
    /// the next tick re-polls or re-submits from the same state.
    #[error("could not reach the bank: {0}")]
    Reachability(#[from] reqwest::Error),

    /// A bank-signed negative response: either a technical return code that
    /// means a malformed/incomplete envelope, or a business-level rejection
    /// (bank return code). Permanent.
    #[error("bank rejected the request (technical={technical_code}, bank={bank_code:?}): {context}")]
    Ebics { technical_code: String, bank_code: Option<String>, context: String },

    /// The enveloped signature on a bank response did not verify against
    /// the accepted bank authentication key. Checked before any return
    /// code is consulted (spec.md §4.5); permanent.
    #[error("enveloped signature on the bank's response did not verify")]
    SignatureVerificationFailed,

    #[error(transparent)]
    Crypto(#[from] nexus_crypto::CryptoError),

    #[error(transparent)]
    Xml(#[from] nexus_xml::XmlError),

    /// A transport-engine invariant was violated by the bank's response
    /// (e.g. a segment count that doesn't match what was announced at
    /// initialization). Treated the same as `Ebics`: permanent, since it
    /// means the bank's own envelope is inconsistent.
    #[error("malformed ebics transaction: {0}")]
    Protocol(String),

    /// The on-disk client/bank key file store (spec.md §4.10) failed to
    /// load or persist: missing file, corrupted JSON, or an I/O error. The
    /// path is folded into the message by the concrete store.
    #[error("key file store: {0}")]
    KeyStore(String),
}

impl EbicsSideError {
    /// `true` for every variant spec.md §4.5 classifies as retryable on the
    /// next tick without mutating any initiated-payment state.
    pub fn is_reachability(&self) -> bool {
        matches!(self, EbicsSideError::Reachability(_))
    }
}
