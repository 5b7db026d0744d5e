//! The EBICS download/upload transaction state machines (spec.md §4.5):
//! init → transfer(N) → receipt, segment concatenation, E002 hybrid
//! decrypt/encrypt, and the zlib (de)compression layered underneath it.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use nexus_xml::{parse, AsRoot, Builder, Destructor};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::io::{Read, Write};

use crate::context::{EbicsContext, OrderDescriptor, ServiceDescriptor, SubscriberKeys};
use crate::envelope::{self, TransactionPhase};
use crate::error::EbicsSideError;

/// Ciphertext bytes per upload segment. Real banks impose varying request
/// size limits; this is a conservative constant well under common ones.
const SEGMENT_SIZE: usize = 1_000_000;

/// Abstracts the single HTTP POST every EBICS phase makes, so tests can
/// substitute a scripted fake instead of a live bank (mirrors
/// `nexus-persistence::InMemoryStore` standing in for Postgres DAOs).
#[async_trait]
pub trait EbicsTransport: Send + Sync {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, EbicsSideError>;
}

/// Production transport: one POST per phase.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

#[async_trait]
impl EbicsTransport for ReqwestTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, EbicsSideError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// `EBICS_NO_DOWNLOAD_DATA_AVAILABLE` or `EBICS_DOWNLOAD_POSTPROCESS_DONE`
    /// (SPEC_FULL.md §8 decision 5): nothing new to ingest this tick.
    Empty,
    Data(Vec<u8>),
}

fn deflate(plaintext: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plaintext).expect("writing to an in-memory buffer cannot fail");
    encoder.finish().expect("writing to an in-memory buffer cannot fail")
}

fn inflate(compressed: &[u8]) -> Result<Vec<u8>, EbicsSideError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| EbicsSideError::Protocol(format!("zlib inflate failed: {e}")))?;
    Ok(out)
}

fn wrap_and_sign(auth_key: &RsaPrivateKey, build: impl FnOnce(&mut Builder)) -> Result<Vec<u8>, EbicsSideError> {
    let mut builder = Builder::new("ebicsRequest");
    builder.root_attr("Version", "H005");
    builder.root_attr("Revision", "1");
    build(&mut builder);
    builder.el("AuthSignature");
    let mut document = builder.build();
    nexus_xml::sign_enveloped(&mut document, auth_key)?;
    Ok(document.to_xml_document())
}

fn response_xml(bytes: Vec<u8>) -> Result<String, EbicsSideError> {
    String::from_utf8(bytes).map_err(|_| EbicsSideError::Protocol("bank response was not valid UTF-8".into()))
}

/// Parses and, unless `bank_auth_key` is `None`, verifies a bank response's
/// enveloped signature. `None` is used only while bootstrapping HPB, before
/// the subscriber has an accepted bank authentication key to verify against
/// (spec.md §4.6's chicken-and-egg: the response being parsed is precisely
/// what delivers that key).
fn parse_response<'a>(xml: &'a str, bank_auth_key: Option<&RsaPublicKey>) -> Result<roxmltree::Document<'a>, EbicsSideError> {
    let document = parse(xml)?;
    match bank_auth_key {
        Some(key) => {
            nexus_xml::verify_enveloped(&document, key).map_err(|_| EbicsSideError::SignatureVerificationFailed)?
        }
        None => tracing::warn!("skipping enveloped-signature verification on a bootstrap response"),
    }
    Ok(document)
}

struct ResponseCodes {
    technical: String,
    bank: Option<String>,
    transaction_id: Option<String>,
    num_segments: Option<u32>,
    order_id: Option<String>,
}

fn text_of(root: &Destructor<'_>, path: &[&str]) -> Result<String, EbicsSideError> {
    let mut cursor = *root;
    for tag in path {
        cursor = cursor.one(tag)?;
    }
    Ok(cursor.text()?)
}

fn opt_text_of(root: &Destructor<'_>, parents: &[&str], leaf: &str) -> Result<Option<String>, EbicsSideError> {
    let mut cursor = *root;
    for tag in parents {
        cursor = cursor.one(tag)?;
    }
    Ok(cursor.opt(leaf)?.map(|d| d.text()).transpose()?)
}

fn read_codes(root: &Destructor<'_>) -> Result<ResponseCodes, EbicsSideError> {
    let technical = text_of(root, &["header", "mutable", "ReturnCode"])?;
    let bank = opt_text_of(root, &["body"], "ReturnCode")?;
    let transaction_id = opt_text_of(root, &["header", "static"], "TransactionID")?;
    let num_segments = opt_text_of(root, &["header", "static"], "NumSegments")?
        .map(|s| s.parse::<u32>().map_err(|_| EbicsSideError::Protocol("NumSegments is not a number".into())))
        .transpose()?;
    let order_id = opt_text_of(root, &["header", "static"], "OrderID")?;
    Ok(ResponseCodes { technical, bank, transaction_id, num_segments, order_id })
}

fn ensure_ok(codes: &ResponseCodes) -> Result<(), EbicsSideError> {
    if codes.technical == envelope::RETURN_OK {
        Ok(())
    } else {
        Err(EbicsSideError::Ebics {
            technical_code: codes.technical.clone(),
            bank_code: codes.bank.clone(),
            context: "bank rejected the request".to_string(),
        })
    }
}

fn segment_payload(root: &Destructor<'_>) -> Result<Vec<u8>, EbicsSideError> {
    let encoded = text_of(root, &["body", "DataTransfer", "OrderData"])?;
    b64.decode(encoded.trim()).map_err(|e| EbicsSideError::Protocol(format!("bad OrderData base64: {e}")))
}

fn wrapped_key(root: &Destructor<'_>) -> Result<Option<Vec<u8>>, EbicsSideError> {
    let encoded = opt_text_of(root, &["body", "DataTransfer", "DataEncryptionInfo"], "TransactionKey")?;
    encoded
        .map(|s| b64.decode(s.trim()).map_err(|e| EbicsSideError::Protocol(format!("bad TransactionKey base64: {e}"))))
        .transpose()
}

/// Drives one download transaction to completion (spec.md §4.5): init,
/// N transfer segments, receipt. `bank_auth_key` is `None` only for the
/// HPB bootstrap request (see [`parse_response`]).
#[allow(clippy::too_many_arguments)]
pub async fn download(
    transport: &dyn EbicsTransport,
    ctx: &EbicsContext,
    keys: &SubscriberKeys,
    bank_auth_key: Option<&RsaPublicKey>,
    service: ServiceDescriptor,
    since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DownloadOutcome, EbicsSideError> {
    let nonce = envelope::random_nonce();
    let init_body = wrap_and_sign(&keys.authentication, |b| {
        envelope::build_init_header(b, ctx, &nonce, now, &OrderDescriptor::Download(service), since);
    })?;
    let init_xml = response_xml(transport.post(&ctx.bank_url, init_body).await?)?;
    let init_document = parse_response(&init_xml, bank_auth_key)?;
    let init_root = init_document.root();
    let codes = read_codes(&init_root)?;

    if codes.technical == envelope::RETURN_NO_DOWNLOAD_DATA {
        return Ok(DownloadOutcome::Empty);
    }
    let transaction_id = codes
        .transaction_id
        .clone()
        .ok_or_else(|| EbicsSideError::Protocol("missing TransactionID on download init response".into()))?;

    if codes.technical == envelope::RETURN_DOWNLOAD_POSTPROCESS_DONE {
        send_receipt(transport, ctx, keys, bank_auth_key, &transaction_id).await?;
        return Ok(DownloadOutcome::Empty);
    }
    ensure_ok(&codes)?;
    let num_segments = codes
        .num_segments
        .ok_or_else(|| EbicsSideError::Protocol("missing NumSegments on download init response".into()))?;

    let mut ciphertext = segment_payload(&init_root)?;
    let wrap = wrapped_key(&init_root)?
        .ok_or_else(|| EbicsSideError::Protocol("missing DataEncryptionInfo on first download segment".into()))?;

    for segment_number in 2..=num_segments {
        let request = wrap_and_sign(&keys.authentication, |b| {
            envelope::build_continuation_header(b, ctx, &transaction_id, TransactionPhase::Transfer, Some(segment_number));
        })?;
        let xml = response_xml(transport.post(&ctx.bank_url, request).await?)?;
        let document = parse_response(&xml, bank_auth_key)?;
        let root = document.root();
        ensure_ok(&read_codes(&root)?)?;
        ciphertext.extend(segment_payload(&root)?);
    }

    send_receipt(transport, ctx, keys, bank_auth_key, &transaction_id).await?;

    let decrypted = nexus_crypto::e002::decrypt_e002(&ciphertext, &wrap, &keys.encryption)?;
    let payload = inflate(&decrypted)?;
    Ok(DownloadOutcome::Data(payload))
}

async fn send_receipt(
    transport: &dyn EbicsTransport,
    ctx: &EbicsContext,
    keys: &SubscriberKeys,
    bank_auth_key: Option<&RsaPublicKey>,
    transaction_id: &str,
) -> Result<(), EbicsSideError> {
    let request = wrap_and_sign(&keys.authentication, |b| {
        envelope::build_continuation_header(b, ctx, transaction_id, TransactionPhase::Receipt, None);
        b.el("header/mutable/ReturnCode").text(envelope::RETURN_OK);
    })?;
    let xml = response_xml(transport.post(&ctx.bank_url, request).await?)?;
    let document = parse_response(&xml, bank_auth_key)?;
    ensure_ok(&read_codes(&document.root())?)
}

/// Drives one upload transaction to completion (spec.md §4.5): compresses
/// and encrypts `plaintext` under the bank's encryption key, splits the
/// ciphertext into segments, and returns the bank-assigned `OrderID`.
#[allow(clippy::too_many_arguments)]
pub async fn upload(
    transport: &dyn EbicsTransport,
    ctx: &EbicsContext,
    keys: &SubscriberKeys,
    bank_auth_key: &RsaPublicKey,
    bank_encryption_key: &RsaPublicKey,
    service: ServiceDescriptor,
    plaintext: &[u8],
    now: DateTime<Utc>,
) -> Result<String, EbicsSideError> {
    let compressed = deflate(plaintext);
    let wrapped = nexus_crypto::e002::encrypt_e002(&compressed, bank_encryption_key)?;
    let segments: Vec<&[u8]> = wrapped.ciphertext.chunks(SEGMENT_SIZE).collect();
    let num_segments = segments.len().max(1) as u32;

    let nonce = envelope::random_nonce();
    let first_segment = segments.first().copied().unwrap_or(&[]);
    let init_body = wrap_and_sign(&keys.authentication, |b| {
        envelope::build_init_header(b, ctx, &nonce, now, &OrderDescriptor::Upload(service), None);
        b.el("header/static/NumSegments").text(num_segments.to_string());
        envelope::write_data_encryption_info(b, &wrapped.wrapped_key);
        envelope::write_order_data_segment(b, first_segment);
    })?;
    let init_xml = response_xml(transport.post(&ctx.bank_url, init_body).await?)?;
    let init_document = parse_response(&init_xml, Some(bank_auth_key))?;
    let init_root = init_document.root();
    let codes = read_codes(&init_root)?;
    ensure_ok(&codes)?;
    let transaction_id = codes
        .transaction_id
        .clone()
        .ok_or_else(|| EbicsSideError::Protocol("missing TransactionID on upload init response".into()))?;
    let order_id = codes
        .order_id
        .clone()
        .ok_or_else(|| EbicsSideError::Protocol("missing OrderID on upload init response".into()))?;

    for (index, segment) in segments.iter().enumerate().skip(1) {
        let segment_number = (index + 1) as u32;
        let request = wrap_and_sign(&keys.authentication, |b| {
            envelope::build_continuation_header(b, ctx, &transaction_id, TransactionPhase::Transfer, Some(segment_number));
            envelope::write_order_data_segment(b, segment);
        })?;
        let xml = response_xml(transport.post(&ctx.bank_url, request).await?)?;
        let document = parse_response(&xml, Some(bank_auth_key))?;
        ensure_ok(&read_codes(&document.root())?)?;
    }

    send_receipt(transport, ctx, keys, Some(bank_auth_key), &transaction_id).await?;
    Ok(order_id)
}
