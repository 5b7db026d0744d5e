//! `payto://` URI parsing (spec.md §3, §8 scenario 2). Only the `iban`
//! method is needed by this core; the bank IBAN/BIC path segments and the
//! `receiver-name` query parameter are what pain.001 and camt.054
//! reconciliation consume.

use url::Url;

use crate::error::PaytoError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payto {
    pub method: String,
    pub bic: Option<String>,
    pub iban: String,
    pub receiver_name: Option<String>,
}

impl Payto {
    pub fn parse(s: &str) -> Result<Self, PaytoError> {
        let url = Url::parse(s).map_err(|e| PaytoError::Malformed(e.to_string()))?;
        if url.scheme() != "payto" {
            return Err(PaytoError::Malformed(format!("expected scheme 'payto', got {:?}", url.scheme())));
        }
        let method = url.host_str().ok_or(PaytoError::MissingMethod)?.to_string();

        let segments: Vec<String> = url
            .path_segments()
            .map(|segs| segs.filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        let (bic, iban) = match segments.as_slice() {
            [iban] => (None, iban.clone()),
            [bic, iban] => (Some(bic.clone()), iban.clone()),
            other => return Err(PaytoError::UnexpectedSegmentCount(other.len())),
        };

        let receiver_name = url
            .query_pairs()
            .find(|(key, _)| key == "receiver-name")
            .map(|(_, value)| value.into_owned());

        Ok(Payto { method, bic, iban, receiver_name })
    }

    /// The canonical form: method and IBAN only, no BIC or query string.
    pub fn canonical(&self) -> String {
        format!("payto://{}/{}", self.method, self.iban)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iban_with_bic_and_receiver_name() {
        let p = Payto::parse("payto://iban/BIC123/CH9300762011623852957?receiver-name=The%20Name").unwrap();
        assert_eq!(p.method, "iban");
        assert_eq!(p.bic.as_deref(), Some("BIC123"));
        assert_eq!(p.iban, "CH9300762011623852957");
        assert_eq!(p.receiver_name.as_deref(), Some("The Name"));
        assert_eq!(p.canonical(), "payto://iban/CH9300762011623852957");
    }

    #[test]
    fn parses_iban_without_bic() {
        let p = Payto::parse("payto://iban/CH9300762011623852957").unwrap();
        assert_eq!(p.bic, None);
        assert_eq!(p.iban, "CH9300762011623852957");
    }

    #[test]
    fn rejects_non_payto_scheme() {
        assert!(Payto::parse("https://iban/CH93").is_err());
    }
}
