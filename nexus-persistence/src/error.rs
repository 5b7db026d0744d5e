//! Error taxonomy for the data model and the persistence port (spec.md §3,
//! §4.7). Duplicate-key conditions are deliberately *not* represented here:
//! spec.md §7 classifies them as an "integrity" outcome, reported through
//! the typed `*Outcome` return values (`RequestUidReuse`, `new: false`), not
//! as an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AmountError {
    #[error("currency code must be 3 uppercase ASCII letters, got {0:?}")]
    InvalidCurrency(String),

    #[error("fractional part has more than 8 digits: {0:?}")]
    FractionTooPrecise(String),

    #[error("could not parse amount {0:?}, expected CCY:VALUE[.FRAC]")]
    Malformed(String),

    #[error("value {0} does not fit in a signed 64-bit (u63) amount")]
    ValueOutOfRange(u64),
}

#[derive(Debug, Error)]
pub enum PaytoError {
    #[error("not a valid payto uri: {0}")]
    Malformed(String),

    #[error("payto uri is missing a method (host component)")]
    MissingMethod,

    #[error("payto iban uri must have one or two path segments, found {0}")]
    UnexpectedSegmentCount(usize),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no initiated payment found for {0}")]
    InitiatedNotFound(String),

    #[error("invalid submission-state transition from {from:?} to {to:?}")]
    InvalidTransition { from: String, to: String },
}
