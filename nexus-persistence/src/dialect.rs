//! The configured bank's protocol dialect, as a closed enum rather than a
//! free string (spec.md §9 open question: new dialects must be added as
//! variants, never accepted as arbitrary text; SPEC_FULL.md §8 decision 6).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankDialect {
    Postfinance,
}

impl FromStr for BankDialect {
    type Err = UnsupportedDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postfinance" => Ok(BankDialect::Postfinance),
            other => Err(UnsupportedDialect(other.to_string())),
        }
    }
}

impl fmt::Display for BankDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankDialect::Postfinance => write!(f, "postfinance"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported bank dialect {0:?}; only \"postfinance\" is supported")]
pub struct UnsupportedDialect(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_dialect() {
        assert_eq!("postfinance".parse::<BankDialect>().unwrap(), BankDialect::Postfinance);
    }

    #[test]
    fn rejects_unknown_dialect_as_a_typed_error_not_free_text() {
        assert!("sparkasse".parse::<BankDialect>().is_err());
    }
}
