//! Wiring-level orchestration on top of the EBICS/ISO 20022/persistence
//! crates: the fetch and submit ticks (C8, C9), the on-disk key file store
//! (C10), and the optional debug file-logger (C11). See spec.md §4.8-§4.10.

pub mod error;
pub mod fetch;
pub mod filelog;
pub mod keystore;
pub mod submit;

pub use error::{FetchError, KeyFileStoreError, SubmitError};
pub use fetch::{DocumentKind, FetchOrchestrator, FetchTickOutcome};
pub use filelog::{FileLogError, FileLogger};
pub use keystore::FileKeyStore;
pub use submit::{SubmitOrchestrator, SubmitOutcome, SubmitTickOutcome};
