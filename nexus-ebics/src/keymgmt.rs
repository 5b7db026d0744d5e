//! INI/HIA/HPB key-management envelopes (spec.md §4.4, §4.6). These use a
//! simpler schema than the BTD/BTU business-transaction envelopes in
//! [`crate::envelope`]: INI and HIA are sent as an unsecured request (the
//! subscriber has no accepted key yet to sign the transport envelope with),
//! and HPB is modeled as a single-segment BTD download like every other
//! business transaction rather than EBICS's dedicated admin-order schema —
//! driven through [`crate::transport::download`] with
//! [`crate::context::ServiceDescriptor::bank_pubkeys`], the same "pragmatic
//! subset of a closed profile" tradeoff `nexus_xml::canonical` documents.

use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use nexus_xml::{parse, AsRoot, Builder};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::io::Write;

use crate::context::{BankKeys, EbicsContext};
use crate::envelope::{nonce_hex, random_nonce};
use crate::error::EbicsSideError;

/// Technical/bank return codes parsed from an INI or HIA response. Order
/// data is never returned for these (spec.md §4.4: only HPB's response
/// carries order data, and HPB is parsed through the ordinary download
/// path — see [`parse_bank_pubkeys`]).
#[derive(Debug, Clone)]
pub struct KeyMgmtResponse {
    pub technical_code: String,
    pub bank_code: Option<String>,
}

fn compress_and_encode(xml: &[u8]) -> String {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml).expect("writing to an in-memory buffer cannot fail");
    let compressed = encoder.finish().expect("writing to an in-memory buffer cannot fail");
    b64.encode(compressed)
}

fn unsecured_envelope(ctx: &EbicsContext, order_type: &str, nonce: &[u8; 16], timestamp: DateTime<Utc>, order_data_b64: String) -> Vec<u8> {
    let mut builder = Builder::new("ebicsUnsecuredRequest");
    builder.root_attr("Version", "H005");
    builder.root_attr("Revision", "1");
    {
        let mut st = builder.el("header/static");
        st.el("HostID").text(ctx.host_id.clone());
        st.el("Nonce").text(nonce_hex(nonce));
        st.el("Timestamp").text(timestamp.to_rfc3339_opts(SecondsFormat::Secs, true));
        st.el("PartnerID").text(ctx.partner_id.clone());
        st.el("UserID").text(ctx.user_id.clone());
        st.el("Product").text(ctx.product.clone());
        st.el("OrderDetails/OrderType").text(order_type.to_string());
        st.el("OrderDetails/OrderAttribute").text("DZNNN");
    }
    builder.el("header/mutable/TransactionPhase").text("Initialisation");
    builder.el("body/DataTransfer/OrderData").text(order_data_b64);
    builder.build().to_xml_document()
}

fn pub_key_value(builder: &mut nexus_xml::Cursor<'_>, modulus: &[u8], exponent: &[u8]) {
    let mut pub_key = builder.el("PubKeyValue");
    pub_key.el("Modulus").text(b64.encode(modulus));
    pub_key.el("Exponent").text(b64.encode(exponent));
}

/// Builds the INI order data (the subscriber's signature public key) and
/// self-signs it with A006 over the unsigned content, then re-embeds the
/// signature as a `PartnerSignature` sibling — a double build, since our
/// in-memory `Builder` has no way to splice a signature over "everything
/// built so far" without first knowing those bytes.
fn signature_order_data(ctx: &EbicsContext, signature_key: &RsaPrivateKey, signature_public: &RsaPublicKey) -> Result<Vec<u8>, EbicsSideError> {
    let modulus = nexus_crypto::keys::modulus_bytes(signature_public);
    let exponent = nexus_crypto::keys::exponent_bytes(signature_public);

    let build_unsigned = || {
        let mut builder = Builder::new("SignaturePubKeyOrderData");
        {
            let mut info = builder.el("SignaturePubKeyInfo");
            info.el("SignatureVersion").text("A006");
            pub_key_value(&mut info, &modulus, &exponent);
        }
        builder.el("PartnerID").text(ctx.partner_id.clone());
        builder.el("UserID").text(ctx.user_id.clone());
        builder.build().to_xml_document()
    };

    let unsigned = build_unsigned();
    let signature = nexus_crypto::sign::sign_a006(&unsigned, signature_key)?;

    let mut builder = Builder::new("SignaturePubKeyOrderData");
    {
        let mut info = builder.el("SignaturePubKeyInfo");
        info.el("SignatureVersion").text("A006");
        pub_key_value(&mut info, &modulus, &exponent);
    }
    builder.el("PartnerID").text(ctx.partner_id.clone());
    builder.el("UserID").text(ctx.user_id.clone());
    builder.el("PartnerSignature").text(b64.encode(signature));
    Ok(builder.build().to_xml_document())
}

fn auth_enc_order_data(ctx: &EbicsContext, encryption_public: &RsaPublicKey, authentication_public: &RsaPublicKey) -> Vec<u8> {
    let enc_modulus = nexus_crypto::keys::modulus_bytes(encryption_public);
    let enc_exponent = nexus_crypto::keys::exponent_bytes(encryption_public);
    let auth_modulus = nexus_crypto::keys::modulus_bytes(authentication_public);
    let auth_exponent = nexus_crypto::keys::exponent_bytes(authentication_public);

    let mut builder = Builder::new("HIARequestOrderData");
    {
        let mut enc = builder.el("EncryptionPubKeyInfo");
        enc.el("EncryptionVersion").text("E002");
        pub_key_value(&mut enc, &enc_modulus, &enc_exponent);
    }
    {
        let mut auth = builder.el("AuthenticationPubKeyInfo");
        auth.el("AuthenticationVersion").text("X002");
        pub_key_value(&mut auth, &auth_modulus, &auth_exponent);
    }
    builder.el("PartnerID").text(ctx.partner_id.clone());
    builder.el("UserID").text(ctx.user_id.clone());
    builder.build().to_xml_document()
}

/// Builds the INI request: the subscriber's signature public key,
/// self-signed with A006, sent unsecured (spec.md §4.4).
pub fn build_ini_request(ctx: &EbicsContext, signature_key: &RsaPrivateKey, now: DateTime<Utc>) -> Result<Vec<u8>, EbicsSideError> {
    let public = signature_key.to_public_key();
    let order_data = signature_order_data(ctx, signature_key, &public)?;
    let encoded = compress_and_encode(&order_data);
    Ok(unsecured_envelope(ctx, "INI", &random_nonce(), now, encoded))
}

/// Builds the HIA request: the subscriber's authentication and encryption
/// public keys, sent unsecured (spec.md §4.4).
pub fn build_hia_request(
    ctx: &EbicsContext,
    encryption_key: &RsaPrivateKey,
    authentication_key: &RsaPrivateKey,
    now: DateTime<Utc>,
) -> Vec<u8> {
    let order_data = auth_enc_order_data(ctx, &encryption_key.to_public_key(), &authentication_key.to_public_key());
    let encoded = compress_and_encode(&order_data);
    unsecured_envelope(ctx, "HIA", &random_nonce(), now, encoded)
}

/// Parses the technical/bank return codes out of an INI or HIA response.
pub fn parse_keymgmt_response(xml: &str) -> Result<KeyMgmtResponse, EbicsSideError> {
    let document = parse(xml)?;
    let root = document.root();
    let technical_code = root.one("header")?.one("mutable")?.one("ReturnCode")?.text()?;
    let bank_code = root.one("body")?.opt("ReturnCode")?.map(|d| d.text()).transpose()?;
    Ok(KeyMgmtResponse { technical_code, bank_code })
}

/// Parses the decrypted, decompressed HPB order-data payload into the
/// bank's two public keys.
pub fn parse_bank_pubkeys(payload: &[u8]) -> Result<BankKeys, EbicsSideError> {
    let xml = String::from_utf8(payload.to_vec())
        .map_err(|_| EbicsSideError::Protocol("HPB order data was not valid UTF-8".into()))?;
    let document = parse(&xml)?;
    let root = document.root();

    let enc_info = root.one("EncryptionPubKeyInfo")?.one("PubKeyValue")?;
    let enc_modulus = b64
        .decode(enc_info.one("Modulus")?.text()?.trim())
        .map_err(|e| EbicsSideError::Protocol(format!("bad encryption Modulus base64: {e}")))?;
    let enc_exponent = b64
        .decode(enc_info.one("Exponent")?.text()?.trim())
        .map_err(|e| EbicsSideError::Protocol(format!("bad encryption Exponent base64: {e}")))?;

    let auth_info = root.one("AuthenticationPubKeyInfo")?.one("PubKeyValue")?;
    let auth_modulus = b64
        .decode(auth_info.one("Modulus")?.text()?.trim())
        .map_err(|e| EbicsSideError::Protocol(format!("bad authentication Modulus base64: {e}")))?;
    let auth_exponent = b64
        .decode(auth_info.one("Exponent")?.text()?.trim())
        .map_err(|e| EbicsSideError::Protocol(format!("bad authentication Exponent base64: {e}")))?;

    Ok(BankKeys {
        encryption: nexus_crypto::keys::rsa_public_from_components(&enc_modulus, &enc_exponent)?,
        authentication: nexus_crypto::keys::rsa_public_from_components(&auth_modulus, &auth_exponent)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_crypto::keys::rsa_generate;
    use nexus_persistence::BankDialect;
    use rsa::traits::PublicKeyParts;

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

    #[test]
    fn ini_request_carries_compressed_self_signed_order_data() {
        let ctx = sample_ctx();
        let signature_key = rsa_generate(2048).unwrap();
        let body = build_ini_request(&ctx, &signature_key, Utc::now()).unwrap();
        let xml = String::from_utf8(body).unwrap();
        assert!(xml.contains("<OrderType>INI</OrderType>"));
        assert!(xml.contains("<OrderData>"));
    }

    #[test]
    fn hia_request_carries_both_public_keys() {
        let ctx = sample_ctx();
        let encryption_key = rsa_generate(2048).unwrap();
        let authentication_key = rsa_generate(2048).unwrap();
        let body = build_hia_request(&ctx, &encryption_key, &authentication_key, Utc::now());
        let xml = String::from_utf8(body).unwrap();
        assert!(xml.contains("<OrderType>HIA</OrderType>"));
    }

    #[test]
    fn parses_ok_keymgmt_response() {
        let mut builder = Builder::new("ebicsKeyManagementResponse");
        builder.el("header/mutable/ReturnCode").text("EBICS_OK");
        builder.el("body/ReturnCode").text("EBICS_OK");
        let xml = String::from_utf8(builder.build().to_xml_document()).unwrap();

        let parsed = parse_keymgmt_response(&xml).unwrap();
        assert_eq!(parsed.technical_code, "EBICS_OK");
        assert_eq!(parsed.bank_code.as_deref(), Some("EBICS_OK"));
    }

    #[test]
    fn round_trips_bank_pubkeys_through_order_data() {
        let encryption_key = rsa_generate(2048).unwrap();
        let authentication_key = rsa_generate(2048).unwrap();
        let order_data = auth_enc_order_data(&sample_ctx(), &encryption_key.to_public_key(), &authentication_key.to_public_key());
        // HPB reuses the HIA order-data shape: encryption + authentication
        // public keys, same element names.
        let bank_keys = parse_bank_pubkeys(&order_data).unwrap();
        assert_eq!(bank_keys.encryption.n(), encryption_key.to_public_key().n());
        assert_eq!(bank_keys.authentication.n(), authentication_key.to_public_key().n());
    }
}
