//! The fetch/ingest orchestrator (C8, spec.md §4.8): polls the bank for each
//! configured document kind, unzips the result where the bank delivers an
//! archive, hands the bytes to the matching parser, and reconciles every
//! typed record through the persistence port.

use std::io::{Cursor, Read};

use chrono::{DateTime, Utc};
use nexus_ebics::context::{BankKeys, EbicsContext, ServiceDescriptor, SubscriberKeys};
use nexus_ebics::error::EbicsSideError;
use nexus_ebics::transport::{self, DownloadOutcome, EbicsTransport};
use nexus_iso20022::{self, CamtRecord, CustomerAck, HacAction, PaymentStatusReport};
use nexus_persistence::port::{InitiatedPort, PaymentPort};
use nexus_persistence::{model, Clock};

use crate::error::FetchError;
use crate::filelog::FileLogger;

/// Which business-transaction family a fetch tick polls (spec.md §4.8:
/// "the set of document kinds"). `Statement` is a SPEC_FULL.md §3
/// completion beyond the distilled spec's named kinds: camt.053 full
/// account statements have no typed parser in `nexus-iso20022` (only the
/// HAC/payment-status/notification trio does), so a fetched statement is
/// only ever dumped by the optional file-logger, never reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    HacLog,
    PaymentStatus,
    Notification,
    Statement,
}

impl DocumentKind {
    fn service(self, scope: &str) -> ServiceDescriptor {
        match self {
            DocumentKind::HacLog => ServiceDescriptor::hac_log(scope),
            DocumentKind::PaymentStatus => ServiceDescriptor::payment_status(scope),
            DocumentKind::Notification => ServiceDescriptor::notification(scope),
            DocumentKind::Statement => ServiceDescriptor::statement(scope),
        }
    }

    fn label(self) -> &'static str {
        match self {
            DocumentKind::HacLog => "hac",
            DocumentKind::PaymentStatus => "payment_status",
            DocumentKind::Notification => "notification",
            DocumentKind::Statement => "statement",
        }
    }

    /// HAC responses are a bare pain.002 document; every other kind's
    /// payload is a ZIP archive of one or more ISO 20022 documents
    /// (spec.md §4.8: "unzip ... or pass through bytes (HAC)").
    fn is_archive(self) -> bool {
        !matches!(self, DocumentKind::HacLog)
    }
}

/// How many records a tick reconciled, and how many document kinds failed
/// with a non-reachability error (spec.md §4.8: "the batch-level
/// orchestrator counts failures and returns an overall success flag").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchTickOutcome {
    pub records_processed: u32,
    pub parse_failures: u32,
    pub kind_failures: u32,
}

pub struct FetchOrchestrator<'a> {
    transport: &'a dyn EbicsTransport,
    ctx: &'a EbicsContext,
    keys: &'a SubscriberKeys,
    bank_keys: &'a BankKeys,
    initiated: &'a dyn InitiatedPort,
    payments: &'a dyn PaymentPort,
    clock: &'a dyn Clock,
    currency: String,
    file_logger: Option<&'a FileLogger>,
}

impl<'a> FetchOrchestrator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: &'a dyn EbicsTransport,
        ctx: &'a EbicsContext,
        keys: &'a SubscriberKeys,
        bank_keys: &'a BankKeys,
        initiated: &'a dyn InitiatedPort,
        payments: &'a dyn PaymentPort,
        clock: &'a dyn Clock,
        currency: impl Into<String>,
        file_logger: Option<&'a FileLogger>,
    ) -> Self {
        FetchOrchestrator {
            transport,
            ctx,
            keys,
            bank_keys,
            initiated,
            payments,
            clock,
            currency: currency.into(),
            file_logger,
        }
    }

    /// Polls every kind in `kinds` since `since`. A reachability failure on
    /// any kind aborts the whole tick immediately, so the next tick re-polls
    /// from the same `since` (spec.md §4.8: "a reachability failure aborts
    /// immediately"). Any other failure is scoped to that one kind: it is
    /// logged and counted, and the tick proceeds to the remaining kinds
    /// (spec.md §7: "fetches log and abort the kind").
    pub async fn tick(&self, kinds: &[DocumentKind], since: Option<DateTime<Utc>>) -> Result<FetchTickOutcome, FetchError> {
        let mut outcome = FetchTickOutcome::default();
        for &kind in kinds {
            match self.fetch_kind(kind, since).await {
                Ok(processed) => outcome.records_processed += processed,
                Err(FetchError::Ebics(err)) if err.is_reachability() => {
                    return Err(FetchError::Ebics(err));
                }
                Err(err) => {
                    tracing::warn!(kind = kind.label(), error = %err, "fetch kind failed, skipping to next kind");
                    outcome.kind_failures += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn fetch_kind(&self, kind: DocumentKind, since: Option<DateTime<Utc>>) -> Result<u32, FetchError> {
        let now = self.clock.now();
        let scope = self.ctx.dialect_scope();
        let outcome = transport::download(
            self.transport,
            self.ctx,
            self.keys,
            Some(&self.bank_keys.authentication),
            kind.service(scope),
            since,
            now,
        )
        .await
        .map_err(FetchError::Ebics)?;

        let payload = match outcome {
            DownloadOutcome::Empty => return Ok(0),
            DownloadOutcome::Data(bytes) => bytes,
        };

        let mut processed = 0u32;
        if kind.is_archive() {
            for (entry_name, entry_bytes) in unzip_entries(&payload)? {
                if let Some(logger) = self.file_logger {
                    if let Err(err) = logger.dump(kind.label(), &entry_name, &entry_bytes, now).await {
                        tracing::warn!(error = %err, "debug file-logger dump failed");
                    }
                }
                processed += self.ingest_entry(kind, &entry_bytes, now).await;
            }
        } else {
            if let Some(logger) = self.file_logger {
                if let Err(err) = logger.dump(kind.label(), "hac.xml", &payload, now).await {
                    tracing::warn!(error = %err, "debug file-logger dump failed");
                }
            }
            processed += self.ingest_entry(kind, &payload, now).await;
        }
        Ok(processed)
    }

    /// Parses and reconciles one document's bytes. Parse failures never
    /// propagate (spec.md §4.8: "parsing failures for one file do not abort
    /// the batch") — they are logged and contribute zero to the processed
    /// count.
    async fn ingest_entry(&self, kind: DocumentKind, bytes: &[u8], now: DateTime<Utc>) -> u32 {
        let xml = match std::str::from_utf8(bytes) {
            Ok(xml) => xml,
            Err(err) => {
                tracing::warn!(kind = kind.label(), error = %err, "fetched document was not valid UTF-8");
                return 0;
            }
        };

        match kind {
            DocumentKind::HacLog => match nexus_iso20022::parse_hac(xml) {
                Ok(acks) => self.reconcile_hac(acks).await,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable HAC log");
                    0
                }
            },
            DocumentKind::PaymentStatus => match nexus_iso20022::parse_payment_status(xml) {
                Ok(report) => {
                    self.reconcile_payment_status(report).await;
                    1
                }
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable payment status");
                    0
                }
            },
            DocumentKind::Notification => match nexus_iso20022::parse_camt054(xml, &self.currency) {
                Ok(records) => self.reconcile_camt(records, now).await,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable notification");
                    0
                }
            },
            DocumentKind::Statement => 0,
        }
    }

    async fn reconcile_hac(&self, acks: Vec<CustomerAck>) -> u32 {
        let mut processed = 0u32;
        for ack in acks {
            let Some(order_id) = &ack.order_id else { continue };
            match ack.action {
                HacAction::OrderHacFinalPos => {
                    match self.initiated.log_success(order_id).await {
                        Ok(Some(request_uid)) => {
                            if let Err(err) = self.initiated.bank_message(&request_uid, "ORDER_HAC_FINAL_POS".to_string()).await {
                                tracing::warn!(error = %err, order_id, "failed to record HAC acceptance");
                            } else {
                                processed += 1;
                            }
                        }
                        Ok(None) => tracing::warn!(order_id, "HAC acceptance for an unknown order id"),
                        Err(err) => tracing::warn!(error = %err, order_id, "HAC log_success lookup failed"),
                    }
                }
                HacAction::OrderHacFinalNeg => {
                    match self.initiated.log_failure(order_id).await {
                        Ok(Some((request_uid, _previous_message))) => {
                            let message = ack.reason_code.clone().unwrap_or_else(|| "ORDER_HAC_FINAL_NEG".to_string());
                            if let Err(err) = self.initiated.bank_failure(&request_uid, message).await {
                                tracing::warn!(error = %err, order_id, "failed to record HAC rejection");
                            } else {
                                processed += 1;
                            }
                        }
                        Ok(None) => tracing::warn!(order_id, "HAC rejection for an unknown order id"),
                        Err(err) => tracing::warn!(error = %err, order_id, "HAC log_failure lookup failed"),
                    }
                }
                _ => {}
            }
        }
        processed
    }

    async fn reconcile_payment_status(&self, report: PaymentStatusReport) {
        if report.effective_code() != "RJCT" {
            return;
        }
        // `OrgnlMsgId` is the only identifier pain.001 round-trips intact:
        // `PmtInfId`/`InstrId`/`EndToEndId` are all emitted as the literal
        // "NOTPROVIDED" (spec.md §4.3), so `tx_id`/`payment_id` never match
        // an initiated payment's `request_uid`. `msg_id` does, since it is
        // emitted as `request_uid` verbatim.
        let request_uid = &report.msg_id;
        let message = report.reasons.join(", ");
        if let Err(err) = self.initiated.bank_failure(request_uid, message).await {
            tracing::warn!(error = %err, request_uid, "failed to record payment-status rejection");
        }
    }

    async fn reconcile_camt(&self, records: Vec<CamtRecord>, now: DateTime<Utc>) -> u32 {
        let mut processed = 0u32;
        for record in records {
            match record {
                CamtRecord::Reversal(reversal) => {
                    let message = reversal.additional_info.unwrap_or_else(|| "camt.054 reversal".to_string());
                    if let Err(err) = self.initiated.reversal(&reversal.message_id, message).await {
                        tracing::warn!(error = %err, message_id = %reversal.message_id, "failed to record reversal");
                    } else {
                        processed += 1;
                    }
                }
                CamtRecord::Incoming(payment) => {
                    processed += self.reconcile_incoming(payment, now).await;
                }
                CamtRecord::Outgoing(payment) => {
                    match self.payments.register_outgoing(payment).await {
                        Ok(outcome) if outcome.new => processed += 1,
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "failed to register outgoing payment"),
                    }
                }
            }
        }
        processed
    }

    async fn reconcile_incoming(&self, payment: nexus_persistence::IncomingPayment, now: DateTime<Utc>) -> u32 {
        match model::find_reserve_pubkey(&payment.subject) {
            Some(reserve_pub) => match self.payments.register_incoming_and_talerable(payment, reserve_pub).await {
                Ok(outcome) => {
                    if outcome.new {
                        tracing::info!("new incoming talerable payment");
                    }
                    1
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to register talerable incoming payment");
                    0
                }
            },
            None => {
                let bounce_amount = payment.amount.clone();
                match self.payments.register_incoming_and_bounce(payment, bounce_amount, now).await {
                    Ok(outcome) => {
                        if outcome.new {
                            tracing::info!("bounced incoming payment without a reserve pub");
                        }
                        1
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to register bounced incoming payment");
                        0
                    }
                }
            }
        }
    }
}

fn unzip_entries(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, FetchError> {
    let cursor = Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| FetchError::Ebics(EbicsSideError::Protocol(format!("invalid ZIP archive: {e}"))))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| FetchError::Ebics(EbicsSideError::Protocol(format!("invalid ZIP entry: {e}"))))?;
        let name = file.name().to_string();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| FetchError::Ebics(EbicsSideError::Protocol(format!("could not read ZIP entry {name}: {e}"))))?;
        entries.push((name, buf));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as b64;
    use base64::Engine;
    use nexus_crypto::keys::rsa_generate;
    use nexus_ebics::envelope;
    use nexus_persistence::{BankDialect, FixedClock, InMemoryStore};
    use nexus_xml::Builder;
    use std::io::Write;
    use std::sync::Mutex;
    use zip::write::SimpleFileOptions;

    fn sample_ctx() -> EbicsContext {
        EbicsContext {
            bank_url: "https://bank.example/ebics".to_string(),
            host_id: "HOST01".to_string(),
            partner_id: "PARTNER1".to_string(),
            user_id: "USER1".to_string(),
            system_id: None,
            product: "nexus".to_string(),
            dialect: BankDialect::Postfinance,
        }
    }

    fn sample_keys() -> SubscriberKeys {
        SubscriberKeys {
            signature: rsa_generate(2048).unwrap(),
            encryption: rsa_generate(2048).unwrap(),
            authentication: rsa_generate(2048).unwrap(),
        }
    }

    struct ScriptedTransport {
        responses: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Vec<u8>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            ScriptedTransport { responses: Mutex::new(responses) }
        }
    }

    #[async_trait]
    impl EbicsTransport for ScriptedTransport {
        async fn post(&self, _url: &str, _body: Vec<u8>) -> Result<Vec<u8>, EbicsSideError> {
            self.responses.lock().unwrap().pop().ok_or_else(|| EbicsSideError::Protocol("no scripted response left".into()))
        }
    }

    fn signed(auth_key: &rsa::RsaPrivateKey, build: impl FnOnce(&mut Builder)) -> Vec<u8> {
        let mut builder = Builder::new("ebicsResponse");
        build(&mut builder);
        builder.el("AuthSignature");
        let mut document = builder.build();
        nexus_xml::sign_enveloped(&mut document, auth_key).unwrap();
        document.to_xml_document()
    }

    fn zip_one_entry(name: &str, contents: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            writer.start_file(name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents).unwrap();
            writer.finish().unwrap();
        }
        buf
    }

    fn download_responses(auth_key: &rsa::RsaPrivateKey, encryption_public: &rsa::RsaPublicKey, transaction_id: &str, plaintext: &[u8]) -> Vec<Vec<u8>> {
        let compressed = {
            use flate2::write::ZlibEncoder;
            use flate2::Compression;
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(plaintext).unwrap();
            encoder.finish().unwrap()
        };
        let wrapped = nexus_crypto::e002::encrypt_e002(&compressed, encryption_public).unwrap();
        let init = signed(auth_key, |b| {
            b.el("header/mutable/ReturnCode").text(envelope::RETURN_OK);
            b.el("header/static/TransactionID").text(transaction_id.to_string());
            b.el("header/static/NumSegments").text("1");
            b.el("body/ReturnCode").text(envelope::RETURN_OK);
            b.el("body/DataTransfer/OrderData").text(b64.encode(&wrapped.ciphertext));
            b.el("body/DataTransfer/DataEncryptionInfo/TransactionKey").text(b64.encode(&wrapped.wrapped_key));
        });
        let receipt = signed(auth_key, |b| {
            b.el("header/mutable/ReturnCode").text(envelope::RETURN_OK);
            b.el("header/static/TransactionID").text(transaction_id.to_string());
            b.el("body/ReturnCode").text(envelope::RETURN_OK);
        });
        vec![init, receipt]
    }

    const CAMT_XML: &str = r#"<?xml version="1.0"?>
<Document><Ntfctn><Ntry>
  <Amt Ccy="EUR">5.00</Amt>
  <Sts><Cd>BOOK</Cd></Sts>
  <BookgDt><Dt>2024-03-01</Dt></BookgDt>
  <NtryDtls><TxDtls>
    <Refs><MsgId>MSG-1</MsgId><AcctSvcrRef>REF-1</AcctSvcrRef></Refs>
    <CdtDbtInd>CRDT</CdtDbtInd>
    <RltdPties><DbtrAcct><Id><IBAN>CH9300762011623852957</IBAN></Id></DbtrAcct></RltdPties>
  </TxDtls></NtryDtls>
</Ntry></Ntfctn></Document>"#;

    #[tokio::test]
    async fn notification_without_reserve_pub_is_bounced_and_counted() {
        let ctx = sample_ctx();
        let keys = sample_keys();
        let bank_auth_key = rsa_generate(2048).unwrap();
        let bank_keys =
            BankKeys { encryption: rsa_generate(2048).unwrap().to_public_key(), authentication: bank_auth_key.to_public_key() };

        let archive = zip_one_entry("camt054.xml", CAMT_XML.as_bytes());
        let responses = download_responses(&bank_auth_key, &keys.encryption.to_public_key(), "TX1", &archive);
        let transport = ScriptedTransport::new(responses);
        let store = InMemoryStore::new();
        let clock = FixedClock::new(chrono::Utc::now());

        let orchestrator =
            FetchOrchestrator::new(&transport, &ctx, &keys, &bank_keys, &store, &store, &clock, "EUR", None);

        let outcome = orchestrator.tick(&[DocumentKind::Notification], None).await.unwrap();
        assert_eq!(outcome.records_processed, 1);
        assert_eq!(outcome.kind_failures, 0);

        // Re-ingesting the same bytes is idempotent (spec.md §8 invariant 5).
        let responses_again = download_responses(&bank_auth_key, &keys.encryption.to_public_key(), "TX2", &archive);
        let transport_again = ScriptedTransport::new(responses_again);
        let orchestrator_again =
            FetchOrchestrator::new(&transport_again, &ctx, &keys, &bank_keys, &store, &store, &clock, "EUR", None);
        let second = orchestrator_again.tick(&[DocumentKind::Notification], None).await.unwrap();
        assert_eq!(second.records_processed, 0);
    }

    #[tokio::test]
    async fn non_reachability_failures_on_one_kind_do_not_abort_the_tick() {
        let ctx = sample_ctx();
        let keys = sample_keys();
        let bank_keys = BankKeys { encryption: rsa_generate(2048).unwrap().to_public_key(), authentication: rsa_generate(2048).unwrap().to_public_key() };
        let store = InMemoryStore::new();
        let clock = FixedClock::new(chrono::Utc::now());

        // No scripted responses at all: every `post` call fails with a
        // `Protocol` error, which is not `is_reachability()`, so both kinds
        // should be individually skipped rather than aborting the tick.
        let transport = ScriptedTransport::new(vec![]);
        let orchestrator = FetchOrchestrator::new(&transport, &ctx, &keys, &bank_keys, &store, &store, &clock, "EUR", None);
        let outcome = orchestrator.tick(&[DocumentKind::Notification, DocumentKind::HacLog], None).await.unwrap();
        assert_eq!(outcome.kind_failures, 2);
    }
}
