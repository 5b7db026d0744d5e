//! The on-disk key file contract the key-exchange state machine (C6) reads
//! and writes (spec.md §3 "client/bank key file", §4.10). The concrete,
//! atomic-rename JSON implementation lives in `nexus-core` as `FileKeyStore`
//! (C10); this crate depends only on the trait, the same way
//! `nexus-persistence`'s ports are consumed by constructor injection
//! instead of a concrete DAO.

use async_trait::async_trait;

use crate::context::{BankKeys, SubscriberKeys};
use crate::error::EbicsSideError;

/// The client key file's monotonic submission flags (spec.md §3: "flags
/// are monotonic (once true, only cleared by explicit re-key)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientKeyFlags {
    pub submitted_ini: bool,
    pub submitted_hia: bool,
}

#[async_trait]
pub trait KeyFileStore: Send + Sync {
    /// `None` if no client key file exists yet (spec.md §4.10: "missing
    /// files are a distinct outcome from corrupted files" — a corrupted
    /// file surfaces as `Err(EbicsSideError::KeyStore)`, not `Ok(None)`).
    async fn load_client_keys(&self) -> Result<Option<(SubscriberKeys, ClientKeyFlags)>, EbicsSideError>;

    /// Atomic: writes to a temporary file in the same directory, then
    /// renames over the target (spec.md §4.10).
    async fn save_client_keys(&self, keys: &SubscriberKeys, flags: ClientKeyFlags) -> Result<(), EbicsSideError>;

    /// `None` until an HPB response has been validated (spec.md §3: "file
    /// is absent until an HPB response has been validated").
    async fn load_bank_keys(&self) -> Result<Option<(BankKeys, bool)>, EbicsSideError>;

    async fn save_bank_keys(&self, keys: &BankKeys, accepted: bool) -> Result<(), EbicsSideError>;
}
