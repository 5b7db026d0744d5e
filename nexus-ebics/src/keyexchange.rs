//! The key-exchange state machine (spec.md §4.6): `new → ini_sent →
//! hia_sent → hpb_received → bank_keys_pending_accept → operational`.
//! There is no persisted state field — the current state is always derived
//! from what is on disk in the client/bank key files, so a crash between a
//! successful network step and the flag write simply re-sends on the next
//! `advance()` (spec.md §4.6: "failure to persist after a successful
//! network step rewinds the local state so the next run re-sends").

use nexus_crypto::keys::rsa_generate;
use nexus_persistence::Clock;

use crate::context::{EbicsContext, ServiceDescriptor, SubscriberKeys};
use crate::envelope::RETURN_OK;
use crate::error::EbicsSideError;
use crate::keymgmt;
use crate::keystore::{ClientKeyFlags, KeyFileStore};
use crate::transport::{self, DownloadOutcome, EbicsTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeState {
    New,
    IniSent,
    HiaSent,
    HpbReceived,
    BankKeysPendingAccept,
    Operational,
}

pub struct KeyExchange<'a> {
    store: &'a dyn KeyFileStore,
    transport: &'a dyn EbicsTransport,
    clock: &'a dyn Clock,
}

fn ensure_keymgmt_ok(response: &keymgmt::KeyMgmtResponse) -> Result<(), EbicsSideError> {
    if response.technical_code == RETURN_OK {
        Ok(())
    } else {
        Err(EbicsSideError::Ebics {
            technical_code: response.technical_code.clone(),
            bank_code: response.bank_code.clone(),
            context: "key-management order rejected".to_string(),
        })
    }
}

impl<'a> KeyExchange<'a> {
    pub fn new(store: &'a dyn KeyFileStore, transport: &'a dyn EbicsTransport, clock: &'a dyn Clock) -> Self {
        KeyExchange { store, transport, clock }
    }

    /// Derives the current state purely from the on-disk key files.
    pub async fn current_state(&self) -> Result<KeyExchangeState, EbicsSideError> {
        let flags = match self.store.load_client_keys().await? {
            None => return Ok(KeyExchangeState::New),
            Some((_, flags)) => flags,
        };
        if !flags.submitted_ini {
            return Ok(KeyExchangeState::New);
        }
        if !flags.submitted_hia {
            return Ok(KeyExchangeState::IniSent);
        }
        match self.store.load_bank_keys().await? {
            None => Ok(KeyExchangeState::HiaSent),
            Some((_, accepted)) => {
                Ok(if accepted { KeyExchangeState::Operational } else { KeyExchangeState::BankKeysPendingAccept })
            }
        }
    }

    async fn ensure_client_keys(&self) -> Result<(SubscriberKeys, ClientKeyFlags), EbicsSideError> {
        if let Some(existing) = self.store.load_client_keys().await? {
            return Ok(existing);
        }
        let keys = SubscriberKeys {
            signature: rsa_generate(2048)?,
            encryption: rsa_generate(2048)?,
            authentication: rsa_generate(2048)?,
        };
        let flags = ClientKeyFlags::default();
        self.store.save_client_keys(&keys, flags).await?;
        Ok((keys, flags))
    }

    /// Drives the state machine forward by exactly one network step from
    /// wherever it currently stands. A no-op returning the current state
    /// once `bank_keys_pending_accept` or `operational` is reached — those
    /// two states only advance via [`Self::accept_bank_keys`], an
    /// operator action, not a network retry.
    pub async fn advance(&self, ctx: &EbicsContext) -> Result<KeyExchangeState, EbicsSideError> {
        match self.current_state().await? {
            KeyExchangeState::New => {
                let (keys, mut flags) = self.ensure_client_keys().await?;
                let body = keymgmt::build_ini_request(ctx, &keys.signature, self.clock.now())?;
                let response = self.transport.post(&ctx.bank_url, body).await?;
                let xml = String::from_utf8(response)
                    .map_err(|_| EbicsSideError::Protocol("bank response was not valid UTF-8".into()))?;
                ensure_keymgmt_ok(&keymgmt::parse_keymgmt_response(&xml)?)?;
                flags.submitted_ini = true;
                self.store.save_client_keys(&keys, flags).await?;
                Ok(KeyExchangeState::IniSent)
            }
            KeyExchangeState::IniSent => {
                let (keys, mut flags) = self.ensure_client_keys().await?;
                let body = keymgmt::build_hia_request(ctx, &keys.encryption, &keys.authentication, self.clock.now());
                let response = self.transport.post(&ctx.bank_url, body).await?;
                let xml = String::from_utf8(response)
                    .map_err(|_| EbicsSideError::Protocol("bank response was not valid UTF-8".into()))?;
                ensure_keymgmt_ok(&keymgmt::parse_keymgmt_response(&xml)?)?;
                flags.submitted_hia = true;
                self.store.save_client_keys(&keys, flags).await?;
                Ok(KeyExchangeState::HiaSent)
            }
            KeyExchangeState::HiaSent => {
                let (keys, _flags) = self.ensure_client_keys().await?;
                let scope = ctx.dialect_scope();
                let outcome = transport::download(
                    self.transport,
                    ctx,
                    &keys,
                    None,
                    ServiceDescriptor::bank_pubkeys(scope),
                    None,
                    self.clock.now(),
                )
                .await?;
                let payload = match outcome {
                    DownloadOutcome::Data(bytes) => bytes,
                    DownloadOutcome::Empty => {
                        return Err(EbicsSideError::Protocol("HPB returned no order data".into()))
                    }
                };
                let bank_keys = keymgmt::parse_bank_pubkeys(&payload)?;
                self.store.save_bank_keys(&bank_keys, false).await?;
                Ok(KeyExchangeState::BankKeysPendingAccept)
            }
            state @ (KeyExchangeState::HpbReceived
            | KeyExchangeState::BankKeysPendingAccept
            | KeyExchangeState::Operational) => Ok(state),
        }
    }

    /// Confirms the pending bank keys' hashes out of band (operator
    /// comparison, or `--auto-accept`) and moves to `operational`
    /// (spec.md §4.6).
    pub async fn accept_bank_keys(&self) -> Result<KeyExchangeState, EbicsSideError> {
        let (bank_keys, _) = self
            .store
            .load_bank_keys()
            .await?
            .ok_or_else(|| EbicsSideError::Protocol("no bank keys pending acceptance".into()))?;
        self.store.save_bank_keys(&bank_keys, true).await?;
        Ok(KeyExchangeState::Operational)
    }

    /// `--force-resubmission` (spec.md §4.6, SPEC_FULL.md §3): clears the
    /// submission flags so the next `advance()` re-plays INI/HIA from
    /// `new`, without deleting the existing keys or bank-key acceptance.
    pub async fn force_resubmission(&self) -> Result<(), EbicsSideError> {
        let (keys, _) = self
            .store
            .load_client_keys()
            .await?
            .ok_or_else(|| EbicsSideError::Protocol("no client keys to resubmit".into()))?;
        self.store.save_client_keys(&keys, ClientKeyFlags::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as b64;
    use base64::Engine;
    use nexus_crypto::keys::{exponent_bytes, modulus_bytes, rsa_generate};
    use nexus_persistence::{BankDialect, FixedClock};
    use nexus_xml::Builder;
    use rsa::RsaPrivateKey;
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    use crate::context::BankKeys;

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

    #[derive(Default)]
    struct MemoryKeyStore {
        client: AsyncMutex<Option<(SubscriberKeys, ClientKeyFlags)>>,
        bank: AsyncMutex<Option<(BankKeys, bool)>>,
    }

    fn clone_subscriber_keys(keys: &SubscriberKeys) -> SubscriberKeys {
        SubscriberKeys {
            signature: keys.signature.clone(),
            encryption: keys.encryption.clone(),
            authentication: keys.authentication.clone(),
        }
    }

    #[async_trait]
    impl KeyFileStore for MemoryKeyStore {
        async fn load_client_keys(&self) -> Result<Option<(SubscriberKeys, ClientKeyFlags)>, EbicsSideError> {
            Ok(self.client.lock().await.as_ref().map(|(k, f)| (clone_subscriber_keys(k), *f)))
        }

        async fn save_client_keys(&self, keys: &SubscriberKeys, flags: ClientKeyFlags) -> Result<(), EbicsSideError> {
            *self.client.lock().await = Some((clone_subscriber_keys(keys), flags));
            Ok(())
        }

        async fn load_bank_keys(&self) -> Result<Option<(BankKeys, bool)>, EbicsSideError> {
            Ok(self.bank.lock().await.clone())
        }

        async fn save_bank_keys(&self, keys: &BankKeys, accepted: bool) -> Result<(), EbicsSideError> {
            *self.bank.lock().await = Some((keys.clone(), accepted));
            Ok(())
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

    fn ok_keymgmt_response() -> Vec<u8> {
        let mut builder = Builder::new("ebicsKeyManagementResponse");
        builder.el("header/mutable/ReturnCode").text(RETURN_OK);
        builder.el("body/ReturnCode").text(RETURN_OK);
        builder.build().to_xml_document()
    }

    fn signed(key: &RsaPrivateKey, build: impl FnOnce(&mut Builder)) -> Vec<u8> {
        let mut builder = Builder::new("ebicsResponse");
        build(&mut builder);
        builder.el("AuthSignature");
        let mut document = builder.build();
        nexus_xml::sign_enveloped(&mut document, key).unwrap();
        document.to_xml_document()
    }

    /// Builds the same `EncryptionPubKeyInfo`/`AuthenticationPubKeyInfo`
    /// order-data shape `keymgmt::parse_bank_pubkeys` expects, wraps it
    /// under E002 for the subscriber's own encryption key, and scripts the
    /// single-segment download + receipt exchange HPB drives through
    /// [`crate::transport::download`].
    fn hpb_download_responses(
        signing_key: &RsaPrivateKey,
        subscriber_encryption_public: &rsa::RsaPublicKey,
        bank_encryption_key: &RsaPrivateKey,
        bank_authentication_key: &RsaPrivateKey,
    ) -> Vec<Vec<u8>> {
        let mut order_data = Builder::new("HIARequestOrderData");
        {
            let enc_public = bank_encryption_key.to_public_key();
            let mut enc = order_data.el("EncryptionPubKeyInfo");
            enc.el("EncryptionVersion").text("E002");
            let mut pub_key = enc.el("PubKeyValue");
            pub_key.el("Modulus").text(b64.encode(modulus_bytes(&enc_public)));
            pub_key.el("Exponent").text(b64.encode(exponent_bytes(&enc_public)));
        }
        {
            let auth_public = bank_authentication_key.to_public_key();
            let mut auth = order_data.el("AuthenticationPubKeyInfo");
            auth.el("AuthenticationVersion").text("X002");
            let mut pub_key = auth.el("PubKeyValue");
            pub_key.el("Modulus").text(b64.encode(modulus_bytes(&auth_public)));
            pub_key.el("Exponent").text(b64.encode(exponent_bytes(&auth_public)));
        }
        let order_data = order_data.build().to_xml_document();

        let compressed = {
            use flate2::write::ZlibEncoder;
            use flate2::Compression;
            use std::io::Write;
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&order_data).unwrap();
            encoder.finish().unwrap()
        };
        let wrapped = nexus_crypto::e002::encrypt_e002(&compressed, subscriber_encryption_public).unwrap();

        let init = signed(signing_key, |b| {
            b.el("header/mutable/ReturnCode").text(RETURN_OK);
            b.el("header/static/TransactionID").text("HPB1");
            b.el("header/static/NumSegments").text("1");
            b.el("body/ReturnCode").text(RETURN_OK);
            b.el("body/DataTransfer/OrderData").text(b64.encode(&wrapped.ciphertext));
            b.el("body/DataTransfer/DataEncryptionInfo/TransactionKey").text(b64.encode(&wrapped.wrapped_key));
        });
        let receipt = signed(signing_key, |b| {
            b.el("header/mutable/ReturnCode").text(RETURN_OK);
            b.el("header/static/TransactionID").text("HPB1");
            b.el("body/ReturnCode").text(RETURN_OK);
        });
        vec![init, receipt]
    }

    #[tokio::test]
    async fn advances_from_new_through_ini_and_hia() {
        let ctx = sample_ctx();
        let store = MemoryKeyStore::default();
        let transport = ScriptedTransport::new(vec![ok_keymgmt_response(), ok_keymgmt_response()]);
        let clock = nexus_persistence::SystemClock;
        let fsm = KeyExchange::new(&store, &transport, &clock);

        assert_eq!(fsm.current_state().await.unwrap(), KeyExchangeState::New);
        assert_eq!(fsm.advance(&ctx).await.unwrap(), KeyExchangeState::IniSent);
        assert_eq!(fsm.advance(&ctx).await.unwrap(), KeyExchangeState::HiaSent);
    }

    #[tokio::test]
    async fn force_resubmission_resets_flags_without_touching_bank_keys() {
        let ctx = sample_ctx();
        let store = MemoryKeyStore::default();
        let transport = ScriptedTransport::new(vec![ok_keymgmt_response()]);
        let clock = FixedClock::new(chrono::Utc::now());
        let fsm = KeyExchange::new(&store, &transport, &clock);

        fsm.advance(&ctx).await.unwrap();
        assert_eq!(fsm.current_state().await.unwrap(), KeyExchangeState::IniSent);

        fsm.force_resubmission().await.unwrap();
        assert_eq!(fsm.current_state().await.unwrap(), KeyExchangeState::New);
    }

    #[tokio::test]
    async fn hpb_fetch_saves_unaccepted_bank_keys_then_accept_makes_it_operational() {
        let ctx = sample_ctx();
        let store = MemoryKeyStore::default();

        let keys = SubscriberKeys {
            signature: rsa_generate(2048).unwrap(),
            encryption: rsa_generate(2048).unwrap(),
            authentication: rsa_generate(2048).unwrap(),
        };
        let subscriber_encryption_public = keys.encryption.to_public_key();
        let signing_key_for_fixture = rsa_generate(2048).unwrap();
        let bank_encryption_key = rsa_generate(2048).unwrap();
        let bank_authentication_key = rsa_generate(2048).unwrap();
        let mut flags = ClientKeyFlags::default();
        flags.submitted_ini = true;
        flags.submitted_hia = true;
        store.save_client_keys(&keys, flags).await.unwrap();

        let responses = hpb_download_responses(
            &signing_key_for_fixture,
            &subscriber_encryption_public,
            &bank_encryption_key,
            &bank_authentication_key,
        );
        let transport = ScriptedTransport::new(responses);
        let clock = FixedClock::new(chrono::Utc::now());
        let fsm = KeyExchange::new(&store, &transport, &clock);

        assert_eq!(fsm.current_state().await.unwrap(), KeyExchangeState::HiaSent);
        assert_eq!(fsm.advance(&ctx).await.unwrap(), KeyExchangeState::BankKeysPendingAccept);
        assert_eq!(fsm.current_state().await.unwrap(), KeyExchangeState::BankKeysPendingAccept);

        assert_eq!(fsm.accept_bank_keys().await.unwrap(), KeyExchangeState::Operational);
        assert_eq!(fsm.current_state().await.unwrap(), KeyExchangeState::Operational);
    }
}
