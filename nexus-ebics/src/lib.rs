//! The EBICS 3 (H005) side of Nexus: subscriber/bank context and business
//! transaction descriptors, the XML envelope builders, the transport engine
//! that drives a download or upload transaction to completion, INI/HIA/HPB
//! key management, the on-disk key file contract, and the key-exchange
//! state machine built on top of all of it. See spec.md §4.4-§4.6.

pub mod context;
pub mod envelope;
pub mod error;
pub mod keyexchange;
pub mod keymgmt;
pub mod keystore;
pub mod transport;

pub use context::{BankKeys, EbicsContext, OrderDescriptor, ServiceDescriptor, SubscriberKeys};
pub use error::EbicsSideError;
pub use keyexchange::{KeyExchange, KeyExchangeState};
pub use keymgmt::KeyMgmtResponse;
pub use keystore::{ClientKeyFlags, KeyFileStore};
pub use transport::{DownloadOutcome, EbicsTransport, ReqwestTransport};
