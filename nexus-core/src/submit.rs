//! The submit orchestrator (C9, spec.md §4.9): for each submittable
//! initiated payment, reject client-side rejects before contacting the
//! bank, otherwise emit pain.001 and upload it, and record whichever
//! outcome the bank or the network gave back.

use chrono::Utc;
use nexus_ebics::context::{BankKeys, EbicsContext, ServiceDescriptor, SubscriberKeys};
use nexus_ebics::transport::{self, EbicsTransport};
use nexus_iso20022::{emit_pain001, OwnAccount};
use nexus_persistence::model::InitiatedPayment;
use nexus_persistence::port::InitiatedPort;
use nexus_persistence::Clock;

use crate::error::SubmitError;

/// What happened to one submittable payment this tick, for callers that
/// want per-payment visibility beyond the aggregate counters (tests, and
/// an eventual CLI `--verbose`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Success { order_id: String },
    ClientRejected { reason: String },
    TransientFailure { message: String },
    PermanentFailure { message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitTickOutcome {
    pub submitted: u32,
    pub client_rejected: u32,
    pub transient_failures: u32,
    pub permanent_failures: u32,
}

pub struct SubmitOrchestrator<'a> {
    transport: &'a dyn EbicsTransport,
    ctx: &'a EbicsContext,
    keys: &'a SubscriberKeys,
    bank_keys: &'a BankKeys,
    initiated: &'a dyn InitiatedPort,
    clock: &'a dyn Clock,
    own_account: &'a OwnAccount,
    currency: String,
}

impl<'a> SubmitOrchestrator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: &'a dyn EbicsTransport,
        ctx: &'a EbicsContext,
        keys: &'a SubscriberKeys,
        bank_keys: &'a BankKeys,
        initiated: &'a dyn InitiatedPort,
        clock: &'a dyn Clock,
        own_account: &'a OwnAccount,
        currency: impl Into<String>,
    ) -> Self {
        SubmitOrchestrator { transport, ctx, keys, bank_keys, initiated, clock, own_account, currency: currency.into() }
    }

    /// One tick: `initiated.submittable(currency)`, then each payment in
    /// order (spec.md §4.9). A reachability failure on one payment's upload
    /// only marks that payment `transient_failure` and the tick continues —
    /// unlike the fetch orchestrator, there is no shared cursor a
    /// reachability failure needs to preserve by aborting early.
    pub async fn tick(&self) -> Result<SubmitTickOutcome, SubmitError> {
        let submittable = self.initiated.submittable(&self.currency).await?;
        let mut outcome = SubmitTickOutcome::default();
        for payment in submittable {
            match self.submit_one(&payment).await? {
                SubmitOutcome::Success { .. } => outcome.submitted += 1,
                SubmitOutcome::ClientRejected { .. } => outcome.client_rejected += 1,
                SubmitOutcome::TransientFailure { .. } => outcome.transient_failures += 1,
                SubmitOutcome::PermanentFailure { .. } => outcome.permanent_failures += 1,
            }
        }
        Ok(outcome)
    }

    async fn submit_one(&self, payment: &InitiatedPayment) -> Result<SubmitOutcome, SubmitError> {
        let now = self.clock.now();

        if payment.creditor_payto.receiver_name.is_none() {
            let reason = "creditor payto lacks a receiver name".to_string();
            self.initiated.bank_failure(&payment.request_uid, reason.clone()).await?;
            return Ok(SubmitOutcome::ClientRejected { reason });
        }

        let document = match emit_pain001(payment, self.own_account) {
            Ok(doc) => doc,
            Err(err) => {
                let reason = err.to_string();
                self.initiated.bank_failure(&payment.request_uid, reason.clone()).await?;
                return Ok(SubmitOutcome::ClientRejected { reason });
            }
        };

        let scope = self.ctx.dialect_scope();
        let result = transport::upload(
            self.transport,
            self.ctx,
            self.keys,
            &self.bank_keys.authentication,
            &self.bank_keys.encryption,
            ServiceDescriptor::credit_transfer(scope),
            &document,
            now,
        )
        .await;

        match result {
            Ok(order_id) => {
                self.initiated.submission_success(payment.id, now, order_id.clone()).await?;
                Ok(SubmitOutcome::Success { order_id })
            }
            Err(err) if err.is_reachability() => {
                let message = err.to_string();
                self.initiated.submission_failure(payment.id, now, message.clone()).await?;
                Ok(SubmitOutcome::TransientFailure { message })
            }
            Err(err) => {
                let message = err.to_string();
                self.initiated.bank_failure(&payment.request_uid, message.clone()).await?;
                Ok(SubmitOutcome::PermanentFailure { message })
            }
        }
    }
}
