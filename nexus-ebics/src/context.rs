//! The subscriber/bank identity and business-transaction descriptors that
//! every EBICS envelope is built from (spec.md §4.4).

use nexus_persistence::BankDialect;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// The subscriber and bank identity a connection is bound to (spec.md §6
/// configuration keys `host_id`, `user_id`, `partner_id`, `system_id?`).
#[derive(Debug, Clone)]
pub struct EbicsContext {
    pub bank_url: String,
    pub host_id: String,
    pub partner_id: String,
    pub user_id: String,
    pub system_id: Option<String>,
    pub product: String,
    pub dialect: BankDialect,
}

impl EbicsContext {
    /// The ISO 3166 scope HPB/BTD service descriptors are addressed under,
    /// per the configured bank dialect (SPEC_FULL.md §8 decision 6: dialects
    /// are a closed enum, so this grows a match arm, never a free string).
    pub fn dialect_scope(&self) -> &'static str {
        match self.dialect {
            BankDialect::Postfinance => "CH",
        }
    }
}

/// The `{service, scope, container, message-name, message-version,
/// option?}` tuple EBICS 3 calls the order a Business-Transaction
/// Download/Upload addresses (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub service: String,
    pub scope: String,
    pub container: Option<String>,
    pub message_name: String,
    pub message_version: String,
    pub option: Option<String>,
}

impl ServiceDescriptor {
    pub fn statement(scope: impl Into<String>) -> Self {
        ServiceDescriptor {
            service: "STM".to_string(),
            scope: scope.into(),
            container: Some("ZIP".to_string()),
            message_name: "camt.053".to_string(),
            message_version: "08".to_string(),
            option: None,
        }
    }

    pub fn notification(scope: impl Into<String>) -> Self {
        ServiceDescriptor {
            service: "STM".to_string(),
            scope: scope.into(),
            container: Some("ZIP".to_string()),
            message_name: "camt.054".to_string(),
            message_version: "08".to_string(),
            option: None,
        }
    }

    pub fn payment_status(scope: impl Into<String>) -> Self {
        ServiceDescriptor {
            service: "PSR".to_string(),
            scope: scope.into(),
            container: Some("ZIP".to_string()),
            message_name: "pain.002".to_string(),
            message_version: "10".to_string(),
            option: None,
        }
    }

    pub fn hac_log(scope: impl Into<String>) -> Self {
        ServiceDescriptor {
            service: "HAC".to_string(),
            scope: scope.into(),
            container: None,
            message_name: "pain.002".to_string(),
            message_version: "03".to_string(),
            option: None,
        }
    }

    pub fn credit_transfer(scope: impl Into<String>) -> Self {
        ServiceDescriptor {
            service: "MCT".to_string(),
            scope: scope.into(),
            container: None,
            message_name: "pain.001".to_string(),
            message_version: "09".to_string(),
            option: None,
        }
    }

    /// HPB's bank-public-key delivery, modeled as a single-segment BTD
    /// download like every other business transaction rather than as
    /// EBICS's dedicated admin-order schema (see `nexus-ebics/src/keymgmt.rs`
    /// — the same "pragmatic subset" tradeoff as `nexus_xml::canonical`).
    pub fn bank_pubkeys(scope: impl Into<String>) -> Self {
        ServiceDescriptor {
            service: "PUB".to_string(),
            scope: scope.into(),
            container: None,
            message_name: "pubkey".to_string(),
            message_version: "1".to_string(),
            option: None,
        }
    }
}

/// Which order-details family the envelope carries: download (`BTD`) or
/// upload (`BTU`) (spec.md §4.4).
#[derive(Debug, Clone)]
pub enum OrderDescriptor {
    Download(ServiceDescriptor),
    Upload(ServiceDescriptor),
}

/// The subscriber's three private keys (spec.md §3 "client key file").
/// `signature` signs order data with A006; `authentication` signs the
/// enveloped transport signature; `encryption` unwraps E002 transaction
/// keys on download and is never used to produce a signature.
pub struct SubscriberKeys {
    pub signature: RsaPrivateKey,
    pub encryption: RsaPrivateKey,
    pub authentication: RsaPrivateKey,
}

/// The bank's two public keys (spec.md §3 "bank key file"), accepted once
/// an operator has confirmed their hash out of band.
#[derive(Clone)]
pub struct BankKeys {
    pub encryption: RsaPublicKey,
    pub authentication: RsaPublicKey,
}
