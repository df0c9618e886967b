//! User accounts for the login screen.
//!
//! Passwords are only ever stored as salted PBKDF2-HMAC-SHA256 digests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::AccountError;
use crate::store::{
    PersistenceBackend, account_key, is_valid_key_segment, load_json,
    save_json,
};

type HmacSha256 = Hmac<Sha256>;

/// Default PBKDF2 work factor.
pub const DEFAULT_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;

/// A salted password digest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    salt: String,
    iterations: u32,
    hash: String,
}

impl PasswordHash {
    /// Hashes `password` with a fresh random salt.
    pub fn new(password: &str, iterations: u32) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let hash = pbkdf2_sha256(password.as_bytes(), &salt, iterations);
        Self {
            salt: hex::encode(salt),
            iterations,
            hash: hex::encode(hash),
        }
    }

    /// Checks `password` against this digest in constant time.
    pub fn verify(&self, password: &str) -> Result<bool, AccountError> {
        let salt = hex::decode(&self.salt)
            .map_err(|err| AccountError::Corrupt(format!("salt: {err}")))?;
        let expected = hex::decode(&self.hash)
            .map_err(|err| AccountError::Corrupt(format!("hash: {err}")))?;
        let actual = pbkdf2_sha256(password.as_bytes(), &salt, self.iterations);
        if expected.len() != actual.len() {
            return Ok(false);
        }
        let diff = expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        Ok(diff == 0)
    }
}

/// PBKDF2 with HMAC-SHA256, one 32-byte output block.
fn pbkdf2_sha256(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let prf = <HmacSha256 as Mac>::new_from_slice(password)
        .expect("HMAC can take key of any size");

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut block: [u8; 32] = mac.finalize().into_bytes().into();
    let mut output = block;

    for _ in 1..iterations.max(1) {
        let mut mac = prf.clone();
        mac.update(&block);
        block = mac.finalize().into_bytes().into();
        for (out, b) in output.iter_mut().zip(block.iter()) {
            *out ^= b;
        }
    }
    output
}

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password_hash: PasswordHash,
    pub created_at: DateTime<Utc>,
}

/// Registration and login.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates an account. Returns `false` if the name is taken, or if the
    /// name or password is unusable.
    async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AccountError>;

    /// Returns `true` if the account exists and the password matches.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AccountError>;
}

/// Keeps accounts as `accounts/<username>` records in any persistence
/// backend.
///
/// Registration checks then writes without a lock, so two processes
/// registering the same name at once may both succeed; the later write wins.
pub struct PersistentAccountStore<B> {
    backend: B,
    iterations: u32,
}

impl<B: PersistenceBackend> PersistentAccountStore<B> {
    #[inline]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Overrides the PBKDF2 work factor for new accounts.
    #[inline]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    async fn find(
        &self,
        username: &str,
    ) -> Result<Option<Account>, AccountError> {
        Ok(load_json(&self.backend, &account_key(username)).await?)
    }
}

#[async_trait]
impl<B: PersistenceBackend> AccountStore for PersistentAccountStore<B> {
    async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AccountError> {
        if !is_valid_key_segment(username) || password.is_empty() {
            debug!("rejected registration for {username:?}");
            return Ok(false);
        }
        if self.find(username).await?.is_some() {
            return Ok(false);
        }

        let account = Account {
            username: username.to_owned(),
            password_hash: PasswordHash::new(password, self.iterations),
            created_at: Utc::now(),
        };
        save_json(&self.backend, &account_key(username), &account).await?;
        info!("registered account {username}");
        Ok(true)
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AccountError> {
        if !is_valid_key_segment(username) {
            return Ok(false);
        }
        let Some(account) = self.find(username).await? else {
            return Ok(false);
        };
        account.password_hash.verify(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store() -> PersistentAccountStore<MemoryStore> {
        PersistentAccountStore::new(MemoryStore::new()).with_iterations(10)
    }

    #[test]
    fn test_pbkdf2_known_vector() {
        // RFC 7914, section 11.
        let output = pbkdf2_sha256(b"passwd", b"salt", 1);
        assert_eq!(
            hex::encode(output),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn test_hash_is_salted() {
        let first = PasswordHash::new("hunter2", 10);
        let second = PasswordHash::new("hunter2", 10);
        assert_ne!(first.hash, second.hash);
        assert!(first.verify("hunter2").unwrap());
        assert!(!first.verify("hunter3").unwrap());
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let store = store();
        assert!(store.register("alice", "s3cret").await.unwrap());
        assert!(!store.register("alice", "other").await.unwrap());

        assert!(store.authenticate("alice", "s3cret").await.unwrap());
        assert!(!store.authenticate("alice", "other").await.unwrap());
        assert!(!store.authenticate("bob", "s3cret").await.unwrap());
    }

    #[tokio::test]
    async fn test_plaintext_is_never_stored() {
        let backend = std::sync::Arc::new(MemoryStore::new());
        let store = PersistentAccountStore::new(backend.clone())
            .with_iterations(10);
        store.register("alice", "s3cret").await.unwrap();

        let record = backend.load("accounts/alice").await.unwrap().unwrap();
        assert!(!record.to_string().contains("s3cret"));
    }

    #[tokio::test]
    async fn test_rejects_unusable_credentials() {
        let store = store();
        assert!(!store.register("", "pw").await.unwrap());
        assert!(!store.register("../alice", "pw").await.unwrap());
        assert!(!store.register("alice", "").await.unwrap());
        assert!(!store.authenticate("../alice", "pw").await.unwrap());
    }
}
