//! Error taxonomy for XML construction, destructuring, and signing
//! (spec.md §4.2, §7 "xml-parse").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    /// The underlying document is not well-formed XML.
    #[error("malformed xml: {0}")]
    Malformed(String),

    /// `one(tag)` found zero or more than one matching child.
    #[error("expected exactly one child named {tag:?}, found {found}")]
    NotExactlyOne { tag: String, found: usize },

    /// `opt(tag)` found more than one matching child.
    #[error("expected at most one child named {tag:?}, found {found}")]
    MoreThanOne { tag: String, found: usize },

    /// A leaf value could not be parsed into the requested type.
    #[error("could not parse content of {path:?} as {expected}: {content:?}")]
    BadContent {
        path: String,
        expected: &'static str,
        content: String,
    },

    /// An `authenticate='true'` node set used by the enveloped signature
    /// could not be located or was empty.
    #[error("enveloped signature error: {0}")]
    Signature(String),

    #[error(transparent)]
    Crypto(#[from] nexus_crypto::CryptoError),
}
