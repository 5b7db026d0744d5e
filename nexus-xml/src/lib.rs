//! The in-memory XML document model Nexus uses for both directions: a
//! `Builder`/`Cursor` API for assembling EBICS and ISO 20022 payloads, a
//! `Destructor` for descending bank responses with explicit cardinality
//! contracts, an exclusive-c14n-shaped canonicalizer, and the enveloped
//! XML-DSIG signing/verification built on top of both. See spec.md §4.2.

pub mod canonical;
pub mod destructor;
pub mod dom;
pub mod error;
pub mod signature;

pub use destructor::{parse, AsRoot, Destructor};
pub use dom::{Builder, Cursor, XmlElement, XmlNode};
pub use error::XmlError;
pub use signature::{sign_enveloped, verify_enveloped};
