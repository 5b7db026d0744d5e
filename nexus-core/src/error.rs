//! Error taxonomy for the orchestrators and the file-based adapters
//! (spec.md §7, §9 "NexusSubmitException with a stage tag" → an algebraic
//! result type where the stage tag becomes a variant tag).

use std::path::PathBuf;

use thiserror::Error;

/// Raised by the submit orchestrator (C9). `Pain` is the client-side
/// rejection stage (spec.md §9); `Ebics` wraps every bank/transport-side
/// outcome, already classified as transient or permanent by
/// [`nexus_ebics::EbicsSideError`].
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("rejected before contacting the bank: {reason}")]
    Pain { reason: String },

    #[error(transparent)]
    Ebics(#[from] nexus_ebics::EbicsSideError),

    #[error(transparent)]
    Persistence(#[from] nexus_persistence::PersistenceError),
}

/// Raised by the fetch/ingest orchestrator (C8). Per-document parse
/// failures never reach this type — they are counted and logged inline
/// (spec.md §4.8, §7: "parsing failures for one file do not abort the
/// batch"). Only reachability and persistence-port errors propagate.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Ebics(#[from] nexus_ebics::EbicsSideError),

    #[error(transparent)]
    Persistence(#[from] nexus_persistence::PersistenceError),
}

/// The on-disk client/bank key file store (C10, spec.md §4.10). Missing
/// files are a distinct outcome from corrupted ones; both are folded into
/// [`nexus_ebics::EbicsSideError::KeyStore`] at the trait boundary, with
/// the path preserved in the message as spec.md §4.10 requires.
#[derive(Debug, Error)]
pub enum KeyFileStoreError {
    #[error("no key file at {0}")]
    NotFound(PathBuf),

    #[error("key file at {path} is corrupted: {source}")]
    Corrupted { path: PathBuf, source: serde_json::Error },

    #[error("key file at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error(transparent)]
    Crypto(#[from] nexus_crypto::CryptoError),
}

impl From<KeyFileStoreError> for nexus_ebics::EbicsSideError {
    fn from(err: KeyFileStoreError) -> Self {
        nexus_ebics::EbicsSideError::KeyStore(err.to_string())
    }
}
