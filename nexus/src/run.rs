//! Wires the core crates into a running process: loads configuration,
//! drives the key-exchange state machine to `operational`, then starts the
//! fetch and submit tick loops (spec.md §5, §9; SPEC_FULL.md §7), modeled
//! on `facilitator/src/run.rs`'s single `run()` entry point assembling the
//! teacher's Axum server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nexus_core::{FetchOrchestrator, FileKeyStore, FileLogger, SubmitOrchestrator};
use nexus_ebics::context::{BankKeys, EbicsContext, SubscriberKeys};
use nexus_ebics::keyexchange::{KeyExchange, KeyExchangeState};
use nexus_ebics::keystore::KeyFileStore;
use nexus_ebics::transport::ReqwestTransport;
use nexus_iso20022::OwnAccount;
use nexus_persistence::{InMemoryStore, SystemClock};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::Config;
use crate::sig_down::SigDown;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    let dialect = config.dialect()?;

    let http_client = reqwest::Client::new();
    let transport = ReqwestTransport::new(http_client.clone());
    let keystore = FileKeyStore::new(config.client_key_path.clone(), config.bank_key_path.clone());
    let clock = SystemClock;

    let ctx = EbicsContext {
        bank_url: config.host_base_url.clone(),
        host_id: config.host_id.clone(),
        partner_id: config.partner_id.clone(),
        user_id: config.user_id.clone(),
        system_id: config.system_id.clone(),
        product: "nexus".to_string(),
        dialect,
    };

    let (keys, bank_keys) = ensure_operational(&keystore, &transport, &clock, &ctx, config.auto_accept_bank_keys).await?;

    let own_account = OwnAccount { iban: config.own_iban.clone(), bic: config.own_bic.clone(), name: config.own_name.clone() };
    let file_logger = config.debug_log_dir.clone().map(FileLogger::new);

    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());

    let sig_down = SigDown::try_new()?;
    let shutdown = sig_down.cancellation_token();

    let fetch_store = Arc::clone(&store);
    let fetch_shutdown = shutdown.clone();
    let fetch_ctx = ctx.clone();
    let fetch_currency = config.currency.clone();
    let fetch_frequency = Duration::from_secs(config.fetch_frequency_secs);
    let fetch_keys = clone_subscriber_keys(&keys);
    let fetch_bank_keys = bank_keys.clone();
    let fetch_client = http_client.clone();

    let fetch_task = tokio::spawn(async move {
        let transport = ReqwestTransport::new(fetch_client);
        let clock = SystemClock;
        let orchestrator = FetchOrchestrator::new(
            &transport,
            &fetch_ctx,
            &fetch_keys,
            &fetch_bank_keys,
            fetch_store.as_ref(),
            fetch_store.as_ref(),
            &clock,
            fetch_currency,
            file_logger.as_ref(),
        );
        run_fetch_loop(orchestrator, fetch_frequency, fetch_shutdown).await;
    });

    let submit_store = Arc::clone(&store);
    let submit_shutdown = shutdown.clone();
    let submit_ctx = ctx.clone();
    let submit_currency = config.currency.clone();
    let submit_frequency = Duration::from_secs(config.submit_frequency_secs);
    let submit_keys = clone_subscriber_keys(&keys);
    let submit_bank_keys = bank_keys.clone();
    let submit_client = http_client.clone();

    let submit_task = tokio::spawn(async move {
        let transport = ReqwestTransport::new(submit_client);
        let clock = SystemClock;
        let orchestrator = SubmitOrchestrator::new(
            &transport,
            &submit_ctx,
            &submit_keys,
            &submit_bank_keys,
            submit_store.as_ref(),
            &clock,
            &own_account,
            submit_currency,
        );
        run_submit_loop(orchestrator, submit_frequency, submit_shutdown).await;
    });

    sig_down.recv().await;
    let _ = tokio::join!(fetch_task, submit_task);
    Ok(())
}

/// Drives the key-exchange state machine from whatever the on-disk key
/// files already record toward `operational` (spec.md §4.6). `new` through
/// `hia_sent` through `bank_keys_pending_accept` only needs network steps;
/// the final step is an operator action unless `--auto-accept-bank-keys`
/// was passed (SPEC_FULL.md §3). A `Reachability` failure here is not
/// retried in a loop by this thin wiring layer — the operator is expected
/// to rerun the binary, the same as any other startup failure.
async fn ensure_operational(
    store: &dyn KeyFileStore,
    transport: &ReqwestTransport,
    clock: &SystemClock,
    ctx: &EbicsContext,
    auto_accept: bool,
) -> Result<(SubscriberKeys, BankKeys), Box<dyn std::error::Error>> {
    let fsm = KeyExchange::new(store, transport, clock);
    loop {
        match fsm.advance(ctx).await? {
            KeyExchangeState::Operational => break,
            KeyExchangeState::BankKeysPendingAccept => {
                if auto_accept {
                    fsm.accept_bank_keys().await?;
                    break;
                }
                return Err("bank keys fetched but not yet accepted; compare the published hash out of band, then rerun with --auto-accept-bank-keys".into());
            }
            _ => continue,
        }
    }

    let (keys, _) = store.load_client_keys().await?.ok_or("client keys missing after key exchange completed")?;
    let (bank_keys, _) = store.load_bank_keys().await?.ok_or("bank keys missing after key exchange completed")?;
    Ok((keys, bank_keys))
}

fn clone_subscriber_keys(keys: &SubscriberKeys) -> SubscriberKeys {
    SubscriberKeys {
        signature: keys.signature.clone(),
        encryption: keys.encryption.clone(),
        authentication: keys.authentication.clone(),
    }
}

/// Polls at `frequency`, never overlapping (spec.md §5: "ticks never
/// overlap for the same subcommand"): the loop body awaits the whole tick
/// before the next `interval.tick()` can fire, so there is no second tick
/// in flight while the first is still running.
async fn run_fetch_loop(orchestrator: FetchOrchestrator<'_>, frequency: Duration, shutdown: tokio_util::sync::CancellationToken) {
    use nexus_core::DocumentKind;

    let kinds = [DocumentKind::HacLog, DocumentKind::PaymentStatus, DocumentKind::Notification, DocumentKind::Statement];
    let cursor: AsyncMutex<Option<DateTime<Utc>>> = AsyncMutex::new(None);
    let mut interval = tokio::time::interval(frequency);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {
                let since = *cursor.lock().await;
                let tick_started_at = Utc::now();
                match orchestrator.tick(&kinds, since).await {
                    Ok(outcome) => {
                        tracing::info!(
                            records = outcome.records_processed,
                            kind_failures = outcome.kind_failures,
                            "fetch tick completed"
                        );
                        *cursor.lock().await = Some(tick_started_at);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "fetch tick aborted by a reachability failure; retrying from the same cursor next tick");
                    }
                }
            }
        }
    }
}

async fn run_submit_loop(orchestrator: SubmitOrchestrator<'_>, frequency: Duration, shutdown: tokio_util::sync::CancellationToken) {
    let mut interval = tokio::time::interval(frequency);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {
                match orchestrator.tick().await {
                    Ok(outcome) => tracing::info!(
                        submitted = outcome.submitted,
                        client_rejected = outcome.client_rejected,
                        transient_failures = outcome.transient_failures,
                        permanent_failures = outcome.permanent_failures,
                        "submit tick completed"
                    ),
                    Err(err) => tracing::warn!(error = %err, "submit tick failed"),
                }
            }
        }
    }
}
