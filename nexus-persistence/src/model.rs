//! The payment records the core reconciles (spec.md §3).

use chrono::{DateTime, Duration, Utc};

use crate::amount::Amount;
use crate::payto::Payto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitiatedId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BounceId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Unsubmitted,
    TransientFailure,
    PermanentFailure,
    Success,
}

/// The fields supplied by the external API when creating an initiated
/// payment; `id` and `submission_state` are assigned by the port.
#[derive(Debug, Clone)]
pub struct NewInitiatedPayment {
    pub amount: Amount,
    pub creditor_payto: Payto,
    pub subject: String,
    pub initiation_time: DateTime<Utc>,
    pub request_uid: String,
}

#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub id: InitiatedId,
    pub amount: Amount,
    pub creditor_payto: Payto,
    pub subject: String,
    pub initiation_time: DateTime<Utc>,
    pub request_uid: String,
    pub submission_state: SubmissionState,
    pub last_submission_time: Option<DateTime<Utc>>,
    pub failure_message: Option<String>,
    pub order_id: Option<String>,
    pub submission_counter: u32,
}

#[derive(Debug, Clone)]
pub struct IncomingPayment {
    pub amount: Amount,
    pub debtor_payto: Payto,
    pub subject: String,
    pub execution_time: DateTime<Utc>,
    pub bank_id: String,
}

#[derive(Debug, Clone)]
pub struct OutgoingPayment {
    pub amount: Amount,
    pub execution_time: DateTime<Utc>,
    pub message_id: String,
    pub creditor_payto: Option<Payto>,
}

/// How a stored incoming payment was classified on ingestion (spec.md §3:
/// "one incoming payment is either talerable, bounced ..., or neither").
#[derive(Debug, Clone)]
pub enum IncomingClassification {
    Talerable { reserve_pub: [u8; 32] },
    Bounced { bounce_id: BounceId, bounce_amount: Amount, scheduled_at: DateTime<Utc> },
}

/// How long a bounce is held before the refund is actually due (SPEC_FULL.md
/// §3 "Bounce scheduling"): `scheduled_at` is the clock's `now()` plus this.
pub const BOUNCE_GRACE_PERIOD: Duration = Duration::hours(24);

/// Looks for a 52-character Base32-Crockford substring that decodes to
/// exactly 32 bytes — a reserve public key (spec.md §3, §8 invariant 3).
/// Scans every 52-character window in document order and returns the
/// first match.
pub fn find_reserve_pubkey(subject: &str) -> Option<[u8; 32]> {
    const RESERVE_PUB_LEN: usize = 52;
    let chars: Vec<char> = subject.chars().collect();
    if chars.len() < RESERVE_PUB_LEN {
        return None;
    }
    for window in chars.windows(RESERVE_PUB_LEN) {
        let candidate: String = window.iter().collect();
        if let Ok(bytes) = nexus_crypto::crockford::decode(&candidate) {
            if bytes.len() == 32 {
                let mut reserve_pub = [0u8; 32];
                reserve_pub.copy_from_slice(&bytes);
                return Some(reserve_pub);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_reserve_pub_embedded_in_free_text() {
        let encoded = nexus_crypto::crockford::encode(&[7u8; 32]);
        assert_eq!(encoded.len(), 52);
        let subject = format!("Taler withdrawal {encoded} thanks");
        let found = find_reserve_pubkey(&subject).unwrap();
        assert_eq!(found, [7u8; 32]);
    }

    #[test]
    fn no_reserve_pub_in_an_unrelated_subject() {
        assert!(find_reserve_pubkey("invoice 2024-001 payment").is_none());
    }
}
