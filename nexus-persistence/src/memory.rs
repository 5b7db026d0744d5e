//! An in-memory reference implementation of the persistence port
//! (SPEC_FULL.md §2 "test tooling"), standing in for the Postgres DAOs the
//! way the teacher's test suite exercises its facilitator logic against
//! fake chain providers instead of live RPC endpoints. Guarded by a single
//! `tokio::sync::Mutex`, matching every other "atomic operation keyed by a
//! natural key" the port promises (spec.md §5).

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::amount::Amount;
use crate::error::PersistenceError;
use crate::model::{
    BounceId, IncomingClassification, IncomingPayment, InitiatedId, InitiatedPayment, NewInitiatedPayment,
    OutgoingPayment, PaymentId, SubmissionState, BOUNCE_GRACE_PERIOD,
};
use crate::port::{
    CreateInitiatedOutcome, InitiatedPort, PaymentPort, RegisterBounceOutcome, RegisterIncomingOutcome,
    RegisterOutgoingOutcome,
};

struct StoredIncoming {
    id: PaymentId,
    payment: IncomingPayment,
    classification: Option<IncomingClassification>,
}

struct StoredOutgoing {
    id: PaymentId,
    payment: OutgoingPayment,
    initiated: bool,
}

#[derive(Default)]
struct State {
    initiated: Vec<InitiatedPayment>,
    incoming: Vec<StoredIncoming>,
    outgoing: Vec<StoredOutgoing>,
}

/// Shared by both `InitiatedPort` and `PaymentPort`: the two traits model
/// one persistence boundary (spec.md §4.7), so one store backs both, the
/// way a single Postgres connection pool would.
pub struct InMemoryStore {
    state: Mutex<State>,
    next_initiated_id: AtomicI64,
    next_payment_id: AtomicI64,
    next_bounce_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            state: Mutex::new(State::default()),
            next_initiated_id: AtomicI64::new(1),
            next_payment_id: AtomicI64::new(1),
            next_bounce_id: AtomicI64::new(1),
        }
    }

    /// Every initiated payment regardless of submission state, for tests
    /// that need to inspect a payment after it has left `submittable`
    /// (e.g. a terminal `Success`/`PermanentFailure`).
    pub async fn all_initiated(&self) -> Vec<InitiatedPayment> {
        self.state.lock().await.initiated.clone()
    }

    fn next_initiated_id(&self) -> InitiatedId {
        InitiatedId(self.next_initiated_id.fetch_add(1, Ordering::Relaxed))
    }

    fn next_payment_id(&self) -> PaymentId {
        PaymentId(self.next_payment_id.fetch_add(1, Ordering::Relaxed))
    }

    fn next_bounce_id(&self) -> BounceId {
        BounceId(self.next_bounce_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InitiatedPort for InMemoryStore {
    async fn create(&self, payment: NewInitiatedPayment) -> Result<CreateInitiatedOutcome, PersistenceError> {
        let mut state = self.state.lock().await;
        if state.initiated.iter().any(|p| p.request_uid == payment.request_uid) {
            return Ok(CreateInitiatedOutcome::RequestUidReuse);
        }
        let id = self.next_initiated_id();
        state.initiated.push(InitiatedPayment {
            id,
            amount: payment.amount,
            creditor_payto: payment.creditor_payto,
            subject: payment.subject,
            initiation_time: payment.initiation_time,
            request_uid: payment.request_uid,
            submission_state: SubmissionState::Unsubmitted,
            last_submission_time: None,
            failure_message: None,
            order_id: None,
            submission_counter: 0,
        });
        Ok(CreateInitiatedOutcome::Success(id))
    }

    async fn submission_success(
        &self,
        id: InitiatedId,
        at: DateTime<Utc>,
        order_id: String,
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        let p = find_by_id_mut(&mut state.initiated, id)?;
        p.submission_state = SubmissionState::Success;
        p.last_submission_time = Some(at);
        p.order_id = Some(order_id);
        p.submission_counter += 1;
        Ok(())
    }

    async fn submission_failure(
        &self,
        id: InitiatedId,
        at: DateTime<Utc>,
        message: String,
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        let p = find_by_id_mut(&mut state.initiated, id)?;
        // transient until a caller decides otherwise; the submit
        // orchestrator (C9) is the one that picks transient vs. permanent
        // based on the EBICS error classification, not this port.
        p.submission_state = SubmissionState::TransientFailure;
        p.last_submission_time = Some(at);
        p.failure_message = Some(message);
        p.submission_counter += 1;
        Ok(())
    }

    async fn bank_message(&self, request_uid: &str, message: String) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        let p = find_by_request_uid_mut(&mut state.initiated, request_uid)?;
        p.failure_message = Some(message);
        Ok(())
    }

    async fn bank_failure(&self, request_uid: &str, message: String) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        let p = find_by_request_uid_mut(&mut state.initiated, request_uid)?;
        p.submission_state = SubmissionState::PermanentFailure;
        p.failure_message = Some(message);
        Ok(())
    }

    async fn reversal(&self, request_uid: &str, message: String) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        let p = find_by_request_uid_mut(&mut state.initiated, request_uid)?;
        p.submission_state = SubmissionState::PermanentFailure;
        p.failure_message = Some(message);
        Ok(())
    }

    async fn log_success(&self, order_id: &str) -> Result<Option<String>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .initiated
            .iter()
            .find(|p| p.order_id.as_deref() == Some(order_id))
            .map(|p| p.request_uid.clone()))
    }

    async fn log_failure(&self, order_id: &str) -> Result<Option<(String, Option<String>)>, PersistenceError> {
        let state = self.state.lock().await;
        Ok(state
            .initiated
            .iter()
            .find(|p| p.order_id.as_deref() == Some(order_id))
            .map(|p| (p.request_uid.clone(), p.failure_message.clone())))
    }

    async fn submittable(&self, currency: &str) -> Result<Vec<InitiatedPayment>, PersistenceError> {
        let state = self.state.lock().await;
        let mut unsubmitted: Vec<&InitiatedPayment> = state
            .initiated
            .iter()
            .filter(|p| p.amount.currency == currency && p.submission_state == SubmissionState::Unsubmitted)
            .collect();
        unsubmitted.sort_by_key(|p| p.initiation_time);

        let mut transient: Vec<&InitiatedPayment> = state
            .initiated
            .iter()
            .filter(|p| p.amount.currency == currency && p.submission_state == SubmissionState::TransientFailure)
            .collect();
        transient.sort_by_key(|p| p.last_submission_time);

        Ok(unsubmitted.into_iter().chain(transient).cloned().collect())
    }
}

#[async_trait]
impl PaymentPort for InMemoryStore {
    async fn register_outgoing(&self, payment: OutgoingPayment) -> Result<RegisterOutgoingOutcome, PersistenceError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.outgoing.iter().find(|o| o.payment.message_id == payment.message_id) {
            return Ok(RegisterOutgoingOutcome { id: existing.id, initiated: existing.initiated, new: false });
        }

        let id = self.next_payment_id();
        let initiated = if let Some(ip) =
            state.initiated.iter_mut().find(|p| p.request_uid == payment.message_id)
        {
            ip.submission_state = SubmissionState::Success;
            true
        } else {
            false
        };
        state.outgoing.push(StoredOutgoing { id, payment, initiated });
        Ok(RegisterOutgoingOutcome { id, initiated, new: true })
    }

    async fn register_incoming_and_talerable(
        &self,
        payment: IncomingPayment,
        reserve_pub: [u8; 32],
    ) -> Result<RegisterIncomingOutcome, PersistenceError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.incoming.iter().find(|i| i.payment.bank_id == payment.bank_id) {
            return Ok(RegisterIncomingOutcome { id: existing.id, new: false });
        }
        let id = self.next_payment_id();
        state.incoming.push(StoredIncoming {
            id,
            payment,
            classification: Some(IncomingClassification::Talerable { reserve_pub }),
        });
        Ok(RegisterIncomingOutcome { id, new: true })
    }

    async fn register_incoming_and_bounce(
        &self,
        payment: IncomingPayment,
        bounce_amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<RegisterBounceOutcome, PersistenceError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.incoming.iter().find(|i| i.payment.bank_id == payment.bank_id) {
            let bounce_id = match &existing.classification {
                Some(IncomingClassification::Bounced { bounce_id, .. }) => *bounce_id,
                _ => self.next_bounce_id(),
            };
            return Ok(RegisterBounceOutcome { id: existing.id, bounce_id, new: false });
        }
        let id = self.next_payment_id();
        let bounce_id = self.next_bounce_id();
        let scheduled_at = now + BOUNCE_GRACE_PERIOD;
        state.incoming.push(StoredIncoming {
            id,
            payment,
            classification: Some(IncomingClassification::Bounced { bounce_id, bounce_amount, scheduled_at }),
        });
        Ok(RegisterBounceOutcome { id, bounce_id, new: true })
    }
}

fn find_by_id_mut(
    initiated: &mut [InitiatedPayment],
    id: InitiatedId,
) -> Result<&mut InitiatedPayment, PersistenceError> {
    initiated
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| PersistenceError::InitiatedNotFound(format!("id={}", id.0)))
}

fn find_by_request_uid_mut<'a>(
    initiated: &'a mut [InitiatedPayment],
    request_uid: &str,
) -> Result<&'a mut InitiatedPayment, PersistenceError> {
    initiated
        .iter_mut()
        .find(|p| p.request_uid == request_uid)
        .ok_or_else(|| PersistenceError::InitiatedNotFound(request_uid.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payto::Payto;

    fn sample_payment(request_uid: &str, currency: &str) -> NewInitiatedPayment {
        NewInitiatedPayment {
            amount: Amount::parse(&format!("{currency}:1.00")).unwrap(),
            creditor_payto: Payto::parse("payto://iban/CH9300762011623852957").unwrap(),
            subject: "test".to_string(),
            initiation_time: Utc::now(),
            request_uid: request_uid.to_string(),
        }
    }

    #[tokio::test]
    async fn creating_the_same_request_uid_twice_is_reported_as_reuse() {
        let store = InMemoryStore::new();
        let first = store.create(sample_payment("uid-1", "EUR")).await.unwrap();
        assert!(matches!(first, CreateInitiatedOutcome::Success(_)));

        let second = store.create(sample_payment("uid-1", "EUR")).await.unwrap();
        assert_eq!(second, CreateInitiatedOutcome::RequestUidReuse);
    }

    #[tokio::test]
    async fn submittable_orders_unsubmitted_before_transient_failures() {
        let store = InMemoryStore::new();
        let a = store.create(sample_payment("uid-a", "EUR")).await.unwrap();
        let b = store.create(sample_payment("uid-b", "EUR")).await.unwrap();
        let CreateInitiatedOutcome::Success(id_a) = a else { panic!() };
        let CreateInitiatedOutcome::Success(_id_b) = b else { panic!() };

        store.submission_failure(id_a, Utc::now(), "HTTP 503".to_string()).await.unwrap();

        let submittable = store.submittable("EUR").await.unwrap();
        assert_eq!(submittable.len(), 2);
        assert_eq!(submittable[0].request_uid, "uid-b");
        assert_eq!(submittable[1].request_uid, "uid-a");
    }

    #[tokio::test]
    async fn register_outgoing_reconciles_with_a_matching_initiated_payment() {
        let store = InMemoryStore::new();
        let created = store.create(sample_payment("uid-x", "EUR")).await.unwrap();
        assert!(matches!(created, CreateInitiatedOutcome::Success(_)));

        let outcome = store
            .register_outgoing(OutgoingPayment {
                amount: Amount::parse("EUR:1.00").unwrap(),
                execution_time: Utc::now(),
                message_id: "uid-x".to_string(),
                creditor_payto: None,
            })
            .await
            .unwrap();
        assert!(outcome.initiated);
        assert!(outcome.new);

        let again = store
            .register_outgoing(OutgoingPayment {
                amount: Amount::parse("EUR:1.00").unwrap(),
                execution_time: Utc::now(),
                message_id: "uid-x".to_string(),
                creditor_payto: None,
            })
            .await
            .unwrap();
        assert!(!again.new);
        assert_eq!(again.id, outcome.id);
    }

    #[tokio::test]
    async fn reingesting_the_same_incoming_payment_is_idempotent() {
        let store = InMemoryStore::new();
        let payment = IncomingPayment {
            amount: Amount::parse("EUR:5.00").unwrap(),
            debtor_payto: Payto::parse("payto://iban/CH9300762011623852957").unwrap(),
            subject: "reserve deposit".to_string(),
            execution_time: Utc::now(),
            bank_id: "ACCTSVCRREF-1".to_string(),
        };
        let reserve_pub = [9u8; 32];
        let first = store.register_incoming_and_talerable(payment.clone(), reserve_pub).await.unwrap();
        assert!(first.new);
        let second = store.register_incoming_and_talerable(payment, reserve_pub).await.unwrap();
        assert!(!second.new);
        assert_eq!(second.id, first.id);
    }
}
