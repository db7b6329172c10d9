//! Durable account pool.
//!
//! Accounts are persisted as a single JSON document and rewritten in full
//! on every mutation. The pool is deliberately simple: no partial writes,
//! no per-account files, one writer at a time. [`SharedStore`] enforces the
//! single-writer discipline at runtime; everything below it is synchronous
//! and directly testable.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::sync::RwLock;

/// Bearer token wrapper that redacts in Debug/Display and zeroizes on drop.
///
/// Unlike a log-only secret, the token must round-trip through the pool
/// file, so Serialize writes the real value. Every other exposure goes
/// through `.expose_secret()` and is grep-auditable.
#[derive(Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Access the raw token value.
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// An empty token means "no credential captured yet".
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl Default for BearerToken {
    fn default() -> Self {
        BearerToken(SecretString::from(String::new()))
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl std::fmt::Display for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for BearerToken {
    fn eq(&self, other: &Self) -> bool {
        self.0.expose_secret() == other.0.expose_secret()
    }
}

impl Serialize for BearerToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for BearerToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| BearerToken(SecretString::from(s)))
    }
}

impl From<String> for BearerToken {
    fn from(s: String) -> Self {
        BearerToken(SecretString::from(s))
    }
}

impl From<&str> for BearerToken {
    fn from(s: &str) -> Self {
        BearerToken(SecretString::from(s.to_string()))
    }
}

/// One upstream account. The email is the unique key; an empty token means
/// the credential has not been captured yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    #[serde(default)]
    pub bearer_token: BearerToken,
    #[serde(default)]
    pub config_id: String,
    /// Epoch seconds of the most recent activation.
    #[serde(default)]
    pub last_used: i64,
    #[serde(default)]
    pub usage_count: u64,
    /// Operator kill-switch; independent of token freshness.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Account {
    /// A fresh account with no captured credential.
    pub fn placeholder(email: &str) -> Self {
        Account {
            email: email.to_string(),
            bearer_token: BearerToken::default(),
            config_id: String::new(),
            last_used: 0,
            usage_count: 0,
            is_active: true,
        }
    }

    /// Operator-enabled and already holding a captured token.
    pub fn is_healthy(&self) -> bool {
        self.is_active && !self.bearer_token.is_empty()
    }
}

/// On-disk shape of the pool file.
#[derive(Serialize, Deserialize)]
struct PoolFile {
    accounts: Vec<Account>,
}

/// Snapshot of the credential a request will use, taken once at the start
/// of handling so a concurrent rotation cannot change it mid-request.
#[derive(Debug, Clone)]
pub struct ActiveCredential {
    pub email: String,
    pub bearer_token: BearerToken,
    pub config_id: String,
}

/// Account store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to write account pool '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode account pool: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The account pool plus the path it persists to.
#[derive(Debug)]
pub struct AccountStore {
    path: PathBuf,
    accounts: Vec<Account>,
}

impl AccountStore {
    pub(crate) fn new(path: impl Into<PathBuf>, accounts: Vec<Account>) -> Self {
        AccountStore {
            path: path.into(),
            accounts,
        }
    }

    /// Load the pool from disk. A missing or corrupt file is not fatal:
    /// the pool is reseeded with two placeholder accounts and persisted
    /// immediately, so the file is always present and well-formed after
    /// startup.
    pub fn load_or_seed(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let accounts = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<PoolFile>(&content) {
                Ok(pool) => pool.accounts,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Account pool is corrupt, reseeding with placeholders"
                    );
                    default_accounts()
                }
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Account pool not readable, reseeding with placeholders"
                );
                default_accounts()
            }
        };

        let store = AccountStore { path, accounts };
        store.persist()?;
        Ok(store)
    }

    /// Rewrite the whole pool. The write goes to a sibling temp file first
    /// and is renamed into place, so a reader never observes a partial
    /// document.
    pub fn persist(&self) -> Result<(), StoreError> {
        let file = PoolFile {
            accounts: self.accounts.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    /// The next account in line: operator-enabled, lowest usage count,
    /// ties broken by insertion order. Token presence is not considered;
    /// this is the raw pool ordering.
    pub fn select_next(&self) -> Option<&Account> {
        select_next(&self.accounts)
    }

    /// Like [`select_next`](Self::select_next), but restricted to accounts
    /// that actually hold a captured token. This is what serving uses: a
    /// fresh placeholder must never shadow a real credential.
    pub fn select_healthy(&self) -> Option<&Account> {
        self.accounts
            .iter()
            .filter(|a| a.is_healthy())
            .min_by_key(|a| a.usage_count)
    }

    /// Record a captured credential for an existing account: overwrite
    /// token and config id, stamp `last_used`, bump `usage_count`, persist.
    /// An unknown email is a no-op.
    pub fn record_use(
        &mut self,
        email: &str,
        bearer_token: BearerToken,
        config_id: &str,
    ) -> Result<(), StoreError> {
        let Some(account) = self.accounts.iter_mut().find(|a| a.email == email) else {
            tracing::warn!(email = %email, "record_use for unknown account, ignoring");
            return Ok(());
        };

        account.bearer_token = bearer_token;
        account.config_id = config_id.to_string();
        account.last_used = chrono::Utc::now().timestamp();
        account.usage_count += 1;
        self.persist()
    }

    /// Add a fresh placeholder for `email` if the pool does not know it
    /// yet. Emails are unique; an existing account is left untouched.
    pub fn ensure_account(&mut self, email: &str) -> Result<(), StoreError> {
        if self.accounts.iter().any(|a| a.email == email) {
            return Ok(());
        }
        self.accounts.push(Account::placeholder(email));
        self.persist()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }
}

fn default_accounts() -> Vec<Account> {
    vec![
        Account::placeholder("user1@example.com"),
        Account::placeholder("user2@example.com"),
    ]
}

/// Selection rule shared by the store and the rotation planner:
/// operator-enabled, lowest usage count, ties broken by original order.
/// `min_by_key` keeps the first of equal keys, which is exactly the
/// insertion-order tie-break.
pub fn select_next(accounts: &[Account]) -> Option<&Account> {
    accounts
        .iter()
        .filter(|a| a.is_active)
        .min_by_key(|a| a.usage_count)
}

/// Clonable handle giving the gateway and the rotation loop shared access
/// to one [`AccountStore`]. All mutations go through the write lock, and
/// readers take point-in-time snapshots, so a rotation can never race a
/// request that is halfway through reading its credential.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<RwLock<AccountStore>>,
}

impl SharedStore {
    pub fn new(store: AccountStore) -> Self {
        SharedStore {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Snapshot of the serving credential, or `None` when no
    /// operator-enabled account holds a captured token.
    pub async fn active_credential(&self) -> Option<ActiveCredential> {
        let guard = self.inner.read().await;
        let account = guard.select_healthy()?;
        Some(ActiveCredential {
            email: account.email.clone(),
            bearer_token: account.bearer_token.clone(),
            config_id: account.config_id.clone(),
        })
    }

    /// Snapshot of the whole pool.
    pub async fn snapshot(&self) -> Vec<Account> {
        self.inner.read().await.accounts().to_vec()
    }

    pub async fn record_use(
        &self,
        email: &str,
        bearer_token: BearerToken,
        config_id: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .record_use(email, bearer_token, config_id)
    }

    pub async fn ensure_account(&self, email: &str) -> Result<(), StoreError> {
        self.inner.write().await.ensure_account(email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_ID: AtomicU64 = AtomicU64::new(0);

    /// Unique pool path under the system temp dir, removed on drop.
    struct TempPool(PathBuf);

    impl TempPool {
        fn new() -> Self {
            let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "gemgate-pool-{}-{}.json",
                std::process::id(),
                id
            ));
            let _ = std::fs::remove_file(&path);
            TempPool(path)
        }

        fn path(&self) -> &Path {
            &self.0
        }
    }

    impl Drop for TempPool {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
            let _ = std::fs::remove_file(self.0.with_extension("json.tmp"));
        }
    }

    fn account(email: &str, token: &str, usage_count: u64, is_active: bool) -> Account {
        Account {
            email: email.to_string(),
            bearer_token: BearerToken::from(token),
            config_id: "cfg".to_string(),
            last_used: 0,
            usage_count,
            is_active,
        }
    }

    #[test]
    fn test_missing_file_seeds_placeholders_and_persists() {
        let pool = TempPool::new();
        let store = AccountStore::load_or_seed(pool.path()).unwrap();

        assert_eq!(store.accounts().len(), 2);
        assert!(store.accounts().iter().all(|a| a.bearer_token.is_empty()));
        assert!(store.accounts().iter().all(|a| a.is_active));

        // The fallback itself is written out immediately.
        let content = std::fs::read_to_string(pool.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["accounts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_replaced() {
        let pool = TempPool::new();
        std::fs::write(pool.path(), "{not valid json").unwrap();

        let store = AccountStore::load_or_seed(pool.path()).unwrap();
        assert_eq!(store.accounts().len(), 2);
        assert_eq!(store.accounts()[0].email, "user1@example.com");

        let content = std::fs::read_to_string(pool.path()).unwrap();
        assert!(serde_json::from_str::<serde_json::Value>(&content).is_ok());
    }

    #[test]
    fn test_roundtrip_preserves_all_fields() {
        let pool = TempPool::new();
        let mut store = AccountStore::new(pool.path(), vec![account("a@x.com", "", 0, true)]);
        store
            .record_use("a@x.com", BearerToken::from("tok-1"), "cfg-1")
            .unwrap();

        let reloaded = AccountStore::load_or_seed(pool.path()).unwrap();
        let acc = &reloaded.accounts()[0];
        assert_eq!(acc.email, "a@x.com");
        assert_eq!(acc.bearer_token.expose_secret(), "tok-1");
        assert_eq!(acc.config_id, "cfg-1");
        assert!(acc.last_used > 0);
        assert_eq!(acc.usage_count, 1);
        assert!(acc.is_active);
    }

    #[test]
    fn test_select_next_prefers_lowest_usage_with_stable_tie_break() {
        let store = AccountStore::new(
            "unused.json",
            vec![
                account("a@x.com", "t", 3, true),
                account("b@x.com", "t", 1, true),
                account("c@x.com", "t", 1, true),
            ],
        );
        // Ties go to the earlier entry.
        assert_eq!(store.select_next().unwrap().email, "b@x.com");
    }

    #[test]
    fn test_select_next_skips_inactive() {
        let store = AccountStore::new(
            "unused.json",
            vec![
                account("a@x.com", "t", 0, false),
                account("b@x.com", "t", 5, true),
            ],
        );
        assert_eq!(store.select_next().unwrap().email, "b@x.com");
    }

    #[test]
    fn test_select_next_empty_when_all_inactive() {
        let store = AccountStore::new(
            "unused.json",
            vec![account("a@x.com", "t", 0, false)],
        );
        assert!(store.select_next().is_none());
    }

    #[test]
    fn test_record_use_unknown_email_is_noop() {
        let pool = TempPool::new();
        let mut store = AccountStore::new(pool.path(), vec![account("a@x.com", "", 2, true)]);
        store
            .record_use("nobody@x.com", BearerToken::from("tok"), "cfg")
            .unwrap();

        assert_eq!(store.accounts()[0].usage_count, 2);
        assert!(store.accounts()[0].bearer_token.is_empty());
        // No persist happened either.
        assert!(!pool.path().exists());
    }

    #[test]
    fn test_bearer_token_debug_redaction() {
        let token = BearerToken::from("very-secret-value");
        assert_eq!(format!("{:?}", token), "[REDACTED]");
        assert_eq!(format!("{}", token), "[REDACTED]");
    }

    #[test]
    fn test_account_debug_does_not_leak_token() {
        let acc = account("a@x.com", "very-secret-value", 0, true);
        let debug = format!("{:?}", acc);
        assert!(!debug.contains("very-secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_account_deserialize_with_missing_fields() {
        let acc: Account = serde_json::from_str(r#"{"email":"a@x.com"}"#).unwrap();
        assert!(acc.bearer_token.is_empty());
        assert_eq!(acc.usage_count, 0);
        assert!(acc.is_active, "is_active defaults to true");
    }

    #[tokio::test]
    async fn test_active_credential_requires_token() {
        let store = SharedStore::new(AccountStore::new(
            "unused.json",
            vec![account("a@x.com", "", 0, true)],
        ));
        assert!(store.active_credential().await.is_none());
    }

    #[tokio::test]
    async fn test_active_credential_skips_tokenless_placeholder() {
        // A placeholder with lower usage must not shadow a real credential.
        let store = SharedStore::new(AccountStore::new(
            "unused.json",
            vec![
                account("fresh@x.com", "", 0, true),
                account("live@x.com", "tok", 3, true),
            ],
        ));
        let creds = store.active_credential().await.unwrap();
        assert_eq!(creds.email, "live@x.com");
    }

    #[test]
    fn test_ensure_account_inserts_once() {
        let pool = TempPool::new();
        let mut store = AccountStore::new(pool.path(), vec![]);
        store.ensure_account("new@x.com").unwrap();
        store.ensure_account("new@x.com").unwrap();

        assert_eq!(store.accounts().len(), 1);
        assert!(store.accounts()[0].bearer_token.is_empty());
        assert!(pool.path().exists(), "Insertion is persisted");
    }

    #[tokio::test]
    async fn test_active_credential_snapshot() {
        let store = SharedStore::new(AccountStore::new(
            "unused.json",
            vec![account("a@x.com", "tok-a", 0, true)],
        ));
        let creds = store.active_credential().await.unwrap();
        assert_eq!(creds.email, "a@x.com");
        assert_eq!(creds.bearer_token.expose_secret(), "tok-a");
        assert_eq!(creds.config_id, "cfg");
    }
}
