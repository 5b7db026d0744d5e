//! Error taxonomy for the ISO 20022 codecs (spec.md §4.3, §7 "xml-parse").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Iso20022Error {
    #[error(transparent)]
    Xml(#[from] nexus_xml::XmlError),

    #[error("pain.001 emission requires a creditor receiver name, none given for request {0:?}")]
    MissingCreditorName(String),

    #[error("unrecognized HAC action {0:?}")]
    UnknownHacAction(String),

    #[error("camt.054 entry currency {entry_currency:?} does not match configured currency {configured:?}")]
    CurrencyMismatch { entry_currency: String, configured: String },

    #[error(transparent)]
    Amount(#[from] nexus_persistence::AmountError),
}
