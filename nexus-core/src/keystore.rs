//! The concrete, atomic-rename JSON implementation of the client/bank key
//! file contract (C10, spec.md §3, §4.10, §6 "Key files"). `nexus-ebics`
//! depends only on the `KeyFileStore` trait; this is the one production
//! implementation, the way `nexus-persistence::InMemoryStore` is the one
//! in-memory implementation of the persistence port.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nexus_crypto::crockford;
use nexus_crypto::keys::{private_to_der, public_to_der, rsa_load_private, rsa_load_public};
use nexus_ebics::context::{BankKeys, SubscriberKeys};
use nexus_ebics::error::EbicsSideError;
use nexus_ebics::keystore::{ClientKeyFlags, KeyFileStore};
use serde::{Deserialize, Serialize};

use crate::error::KeyFileStoreError;

/// `client-keys.json` (spec.md §6): three RSA private keys, Base32-Crockford
/// of their DER encoding, plus the two monotonic submission flags.
#[derive(Debug, Serialize, Deserialize)]
struct ClientKeyFile {
    signature_private_key: String,
    encryption_private_key: String,
    authentication_private_key: String,
    submitted_ini: bool,
    submitted_hia: bool,
}

/// `bank-keys.json` (spec.md §6): the bank's two RSA public keys plus
/// whether an operator has accepted their hash.
#[derive(Debug, Serialize, Deserialize)]
struct BankKeyFile {
    bank_encryption_public_key: String,
    bank_authentication_public_key: String,
    accepted: bool,
}

pub struct FileKeyStore {
    client_path: PathBuf,
    bank_path: PathBuf,
}

impl FileKeyStore {
    pub fn new(client_path: impl Into<PathBuf>, bank_path: impl Into<PathBuf>) -> Self {
        FileKeyStore { client_path: client_path.into(), bank_path: bank_path.into() }
    }
}

/// Writes `contents` to a temporary file in the same directory as `path`,
/// then renames over `path` (spec.md §4.10: "Writes go to a temporary file
/// in the same directory, then atomically rename over the target").
async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), KeyFileStoreError> {
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| KeyFileStoreError::Io { path: tmp_path.clone(), source: e })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| KeyFileStoreError::Io { path: path.to_path_buf(), source: e })
}

/// Reads and JSON-decodes a key file, distinguishing "missing" from
/// "corrupted" (spec.md §4.10).
async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, KeyFileStoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| KeyFileStoreError::Corrupted { path: path.to_path_buf(), source: e })?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(KeyFileStoreError::Io { path: path.to_path_buf(), source: e }),
    }
}

fn decode_private_key(encoded: &str) -> Result<rsa::RsaPrivateKey, KeyFileStoreError> {
    let der = crockford::decode(encoded).map_err(KeyFileStoreError::Crypto)?;
    rsa_load_private(&der).map_err(KeyFileStoreError::Crypto)
}

fn decode_public_key(encoded: &str) -> Result<rsa::RsaPublicKey, KeyFileStoreError> {
    let der = crockford::decode(encoded).map_err(KeyFileStoreError::Crypto)?;
    rsa_load_public(&der).map_err(KeyFileStoreError::Crypto)
}

fn encode_private_key(key: &rsa::RsaPrivateKey) -> Result<String, KeyFileStoreError> {
    Ok(crockford::encode(&private_to_der(key).map_err(KeyFileStoreError::Crypto)?))
}

fn encode_public_key(key: &rsa::RsaPublicKey) -> Result<String, KeyFileStoreError> {
    Ok(crockford::encode(&public_to_der(key).map_err(KeyFileStoreError::Crypto)?))
}

#[async_trait]
impl KeyFileStore for FileKeyStore {
    async fn load_client_keys(&self) -> Result<Option<(SubscriberKeys, ClientKeyFlags)>, EbicsSideError> {
        let Some(file) = read_json::<ClientKeyFile>(&self.client_path).await? else {
            return Ok(None);
        };
        let keys = SubscriberKeys {
            signature: decode_private_key(&file.signature_private_key)?,
            encryption: decode_private_key(&file.encryption_private_key)?,
            authentication: decode_private_key(&file.authentication_private_key)?,
        };
        let flags = ClientKeyFlags { submitted_ini: file.submitted_ini, submitted_hia: file.submitted_hia };
        Ok(Some((keys, flags)))
    }

    async fn save_client_keys(&self, keys: &SubscriberKeys, flags: ClientKeyFlags) -> Result<(), EbicsSideError> {
        let file = ClientKeyFile {
            signature_private_key: encode_private_key(&keys.signature)?,
            encryption_private_key: encode_private_key(&keys.encryption)?,
            authentication_private_key: encode_private_key(&keys.authentication)?,
            submitted_ini: flags.submitted_ini,
            submitted_hia: flags.submitted_hia,
        };
        let contents = serde_json::to_vec_pretty(&file)
            .map_err(|e| KeyFileStoreError::Corrupted { path: self.client_path.clone(), source: e })?;
        write_atomically(&self.client_path, &contents).await?;
        Ok(())
    }

    async fn load_bank_keys(&self) -> Result<Option<(BankKeys, bool)>, EbicsSideError> {
        let Some(file) = read_json::<BankKeyFile>(&self.bank_path).await? else {
            return Ok(None);
        };
        let keys = BankKeys {
            encryption: decode_public_key(&file.bank_encryption_public_key)?,
            authentication: decode_public_key(&file.bank_authentication_public_key)?,
        };
        Ok(Some((keys, file.accepted)))
    }

    async fn save_bank_keys(&self, keys: &BankKeys, accepted: bool) -> Result<(), EbicsSideError> {
        let file = BankKeyFile {
            bank_encryption_public_key: encode_public_key(&keys.encryption)?,
            bank_authentication_public_key: encode_public_key(&keys.authentication)?,
            accepted,
        };
        let contents = serde_json::to_vec_pretty(&file)
            .map_err(|e| KeyFileStoreError::Corrupted { path: self.bank_path.clone(), source: e })?;
        write_atomically(&self.bank_path, &contents).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_crypto::keys::rsa_generate;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nexus-keystore-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn missing_client_key_file_is_none_not_an_error() {
        let dir = temp_dir();
        let store = FileKeyStore::new(dir.join("client-keys.json"), dir.join("bank-keys.json"));
        assert!(store.load_client_keys().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn client_keys_round_trip_through_disk() {
        let dir = temp_dir();
        let store = FileKeyStore::new(dir.join(format!("client-{}.json", line!())), dir.join("bank.json"));

        let keys = SubscriberKeys {
            signature: rsa_generate(2048).unwrap(),
            encryption: rsa_generate(2048).unwrap(),
            authentication: rsa_generate(2048).unwrap(),
        };
        let flags = ClientKeyFlags { submitted_ini: true, submitted_hia: false };
        store.save_client_keys(&keys, flags).await.unwrap();

        let (reloaded_keys, reloaded_flags) = store.load_client_keys().await.unwrap().unwrap();
        assert_eq!(reloaded_flags, flags);
        use rsa::traits::PublicKeyParts;
        assert_eq!(reloaded_keys.signature.to_public_key().n(), keys.signature.to_public_key().n());
    }

    #[tokio::test]
    async fn corrupted_client_key_file_is_a_distinct_error_from_missing() {
        let dir = temp_dir();
        let path = dir.join(format!("corrupt-{}.json", line!()));
        tokio::fs::write(&path, b"not json").await.unwrap();
        let store = FileKeyStore::new(path, dir.join("bank.json"));
        assert!(store.load_client_keys().await.is_err());
    }

    #[tokio::test]
    async fn bank_keys_round_trip_with_acceptance_flag() {
        let dir = temp_dir();
        let store = FileKeyStore::new(dir.join("client.json"), dir.join(format!("bank-{}.json", line!())));
        let keys = BankKeys { encryption: rsa_generate(2048).unwrap().to_public_key(), authentication: rsa_generate(2048).unwrap().to_public_key() };
        store.save_bank_keys(&keys, false).await.unwrap();
        let (_, accepted) = store.load_bank_keys().await.unwrap().unwrap();
        assert!(!accepted);

        store.save_bank_keys(&keys, true).await.unwrap();
        let (_, accepted) = store.load_bank_keys().await.unwrap().unwrap();
        assert!(accepted);
    }
}
