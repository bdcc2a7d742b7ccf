//! Encrypted per-principal model API keys.
//!
//! Keys are stored AES-256-GCM encrypted (random nonce prepended to the
//! ciphertext, base64 over the wire), decrypted once per job, and held in
//! memory wrappers that zero on drop.

use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use zeroize::Zeroizing;

use lclip_models::PrincipalId;
use lclip_store::ArtifactStore;

use crate::error::{WorkerError, WorkerResult};

const NONCE_LEN: usize = 12;

/// A decrypted model API key. Zeroed on drop.
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
    pub fn new(plaintext: String) -> Self {
        Self(Zeroizing::new(plaintext))
    }

    /// Borrow the key for a model call.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

/// Vault for encrypted model credentials.
#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn ArtifactStore>,
    cipher: Aes256Gcm,
}

impl CredentialVault {
    /// Create a vault with a 32-byte master key.
    pub fn new(store: Arc<dyn ArtifactStore>, master_key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(master_key));
        Self { store, cipher }
    }

    /// Create from `CREDENTIAL_MASTER_KEY` (base64-encoded 32 bytes).
    pub fn from_env(store: Arc<dyn ArtifactStore>) -> WorkerResult<Self> {
        let encoded = std::env::var("CREDENTIAL_MASTER_KEY")
            .map_err(|_| WorkerError::internal("CREDENTIAL_MASTER_KEY not set"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| WorkerError::internal("CREDENTIAL_MASTER_KEY is not valid base64"))?;
        let master: [u8; 32] = bytes
            .try_into()
            .map_err(|_| WorkerError::internal("CREDENTIAL_MASTER_KEY must be 32 bytes"))?;
        Ok(Self::new(store, &master))
    }

    /// Encrypt and persist a principal's model API key.
    pub async fn store_key(&self, principal: &PrincipalId, plaintext: &str) -> WorkerResult<()> {
        let ciphertext = self.encrypt(plaintext)?;
        self.store.put_credential(principal, &ciphertext).await?;
        Ok(())
    }

    /// Load and decrypt a principal's model API key.
    ///
    /// Absent key → `MissingCredential`; undecryptable blob →
    /// `InvalidCredential`.
    pub async fn load_key(&self, principal: &PrincipalId) -> WorkerResult<ApiKey> {
        let ciphertext = self
            .store
            .get_credential(principal)
            .await?
            .ok_or(WorkerError::MissingCredential)?;
        let plaintext = self.decrypt(&ciphertext)?;
        Ok(ApiKey(plaintext))
    }

    /// Remove a principal's stored key.
    pub async fn delete_key(&self, principal: &PrincipalId) -> WorkerResult<()> {
        self.store.delete_credential(principal).await?;
        Ok(())
    }

    fn encrypt(&self, plaintext: &str) -> WorkerResult<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| WorkerError::internal("credential encryption failed"))?;

        let mut payload = nonce.to_vec();
        payload.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(payload))
    }

    fn decrypt(&self, encoded: &str) -> WorkerResult<Zeroizing<String>> {
        let payload = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| WorkerError::InvalidCredential)?;
        if payload.len() <= NONCE_LEN {
            return Err(WorkerError::InvalidCredential);
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| WorkerError::InvalidCredential)?;
        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| WorkerError::InvalidCredential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lclip_store::MemoryArtifactStore;

    fn vault() -> CredentialVault {
        CredentialVault::new(Arc::new(MemoryArtifactStore::new()), &[7u8; 32])
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let vault = vault();
        let principal = PrincipalId::new("user-1");

        vault.store_key(&principal, "sk-secret-key").await.unwrap();
        let key = vault.load_key(&principal).await.unwrap();
        assert_eq!(key.expose(), "sk-secret-key");
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let vault = vault();
        let err = vault
            .load_key(&PrincipalId::new("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::MissingCredential));
    }

    #[tokio::test]
    async fn test_wrong_master_key_is_invalid_credential() {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let principal = PrincipalId::new("user-1");

        let vault_a = CredentialVault::new(Arc::clone(&store), &[1u8; 32]);
        vault_a.store_key(&principal, "sk-secret").await.unwrap();

        let vault_b = CredentialVault::new(store, &[2u8; 32]);
        let err = vault_b.load_key(&principal).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidCredential));
    }

    #[tokio::test]
    async fn test_delete_key() {
        let vault = vault();
        let principal = PrincipalId::new("user-1");
        vault.store_key(&principal, "sk").await.unwrap();
        vault.delete_key(&principal).await.unwrap();
        assert!(matches!(
            vault.load_key(&principal).await.unwrap_err(),
            WorkerError::MissingCredential
        ));
    }

    #[test]
    fn test_ciphertexts_are_salted() {
        let vault = vault();
        let a = vault.encrypt("same-key").unwrap();
        let b = vault.encrypt("same-key").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_api_key_debug_is_masked() {
        let key = ApiKey::new("sk-very-secret".to_string());
        assert_eq!(format!("{:?}", key), "ApiKey(****)");
    }
}
