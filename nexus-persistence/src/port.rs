//! The typed persistence port (spec.md §4.7, §9 "database access as an
//! ambient transactional object" — reframed here as an explicit trait
//! consumed by constructor injection instead of a global ORM). Concrete
//! Postgres DAOs are an external collaborator; this crate only defines the
//! contract plus an in-memory reference implementation (`memory`) used by
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::amount::Amount;
use crate::error::PersistenceError;
use crate::model::{
    BounceId, IncomingPayment, InitiatedId, InitiatedPayment, NewInitiatedPayment, OutgoingPayment, PaymentId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateInitiatedOutcome {
    Success(InitiatedId),
    RequestUidReuse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOutgoingOutcome {
    pub id: PaymentId,
    pub initiated: bool,
    pub new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterIncomingOutcome {
    pub id: PaymentId,
    pub new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBounceOutcome {
    pub id: PaymentId,
    pub bounce_id: BounceId,
    pub new: bool,
}

/// Operations on initiated payments: created by the external API, consumed
/// by the submit orchestrator, mutated only by it (spec.md §3).
#[async_trait]
pub trait InitiatedPort: Send + Sync {
    async fn create(&self, payment: NewInitiatedPayment) -> Result<CreateInitiatedOutcome, PersistenceError>;

    async fn submission_success(
        &self,
        id: InitiatedId,
        at: DateTime<Utc>,
        order_id: String,
    ) -> Result<(), PersistenceError>;

    async fn submission_failure(
        &self,
        id: InitiatedId,
        at: DateTime<Utc>,
        message: String,
    ) -> Result<(), PersistenceError>;

    async fn bank_message(&self, request_uid: &str, message: String) -> Result<(), PersistenceError>;
    async fn bank_failure(&self, request_uid: &str, message: String) -> Result<(), PersistenceError>;

    /// A later camt reversal of an already-`success` payment. Non-monotonic
    /// by design (spec.md §9): overrides the prior terminal state rather
    /// than being rejected as an invalid transition.
    async fn reversal(&self, request_uid: &str, message: String) -> Result<(), PersistenceError>;

    /// Resolves a HAC `ORDER_HAC_FINAL_POS` entry back to its request-uid.
    /// A pure lookup; the caller still mutates state via `submission_success`.
    async fn log_success(&self, order_id: &str) -> Result<Option<String>, PersistenceError>;

    /// Resolves a HAC `ORDER_HAC_FINAL_NEG` entry back to its request-uid,
    /// along with whatever failure message was already on file.
    async fn log_failure(&self, order_id: &str) -> Result<Option<(String, Option<String>)>, PersistenceError>;

    /// Unsubmitted payments ordered by creation time, then transient-failure
    /// payments ordered by last submission time — the retry policy (spec.md
    /// §4.7): every unsubmitted payment is tried before any retry.
    async fn submittable(&self, currency: &str) -> Result<Vec<InitiatedPayment>, PersistenceError>;
}

/// Operations on incoming/outgoing payments: created by the fetch
/// orchestrator (spec.md §3).
#[async_trait]
pub trait PaymentPort: Send + Sync {
    async fn register_outgoing(&self, payment: OutgoingPayment) -> Result<RegisterOutgoingOutcome, PersistenceError>;

    async fn register_incoming_and_talerable(
        &self,
        payment: IncomingPayment,
        reserve_pub: [u8; 32],
    ) -> Result<RegisterIncomingOutcome, PersistenceError>;

    async fn register_incoming_and_bounce(
        &self,
        payment: IncomingPayment,
        bounce_amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<RegisterBounceOutcome, PersistenceError>;
}
