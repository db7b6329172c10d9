//! Integration tests for the account pool file lifecycle.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use gemgate::store::{AccountStore, BearerToken, SharedStore};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

struct TempPool(PathBuf);

impl TempPool {
    fn new() -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "gemgate-pool-it-{}-{}.json",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_file(&path);
        TempPool(path)
    }
}

impl Drop for TempPool {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
        let _ = std::fs::remove_file(self.0.with_extension("json.tmp"));
    }
}

#[test]
fn test_startup_always_leaves_a_wellformed_file() {
    let pool = TempPool::new();

    // First start: no file at all.
    let store = AccountStore::load_or_seed(&pool.0).unwrap();
    assert_eq!(store.accounts().len(), 2);
    let first = std::fs::read_to_string(&pool.0).unwrap();
    serde_json::from_str::<serde_json::Value>(&first).unwrap();

    // Operator truncates the file mid-edit; next start recovers.
    std::fs::write(&pool.0, r#"{"accounts": [{"email": "a@x.co"#).unwrap();
    let store = AccountStore::load_or_seed(&pool.0).unwrap();
    assert_eq!(store.accounts().len(), 2);
    assert_eq!(store.accounts()[0].email, "user1@example.com");
    let second = std::fs::read_to_string(&pool.0).unwrap();
    serde_json::from_str::<serde_json::Value>(&second).unwrap();
}

#[tokio::test]
async fn test_captured_credential_survives_restart() {
    let pool = TempPool::new();

    {
        let store = SharedStore::new(AccountStore::load_or_seed(&pool.0).unwrap());
        store
            .record_use(
                "user2@example.com",
                BearerToken::from("captured-token"),
                "cfg-99",
            )
            .await
            .unwrap();
    }

    // Restart: the capture is durable and wins selection over the
    // untouched placeholder.
    let store = SharedStore::new(AccountStore::load_or_seed(&pool.0).unwrap());
    let creds = store.active_credential().await.unwrap();
    assert_eq!(creds.email, "user2@example.com");
    assert_eq!(creds.bearer_token.expose_secret(), "captured-token");
    assert_eq!(creds.config_id, "cfg-99");

    let snapshot = store.snapshot().await;
    let captured = snapshot
        .iter()
        .find(|a| a.email == "user2@example.com")
        .unwrap();
    assert_eq!(captured.usage_count, 1);
    assert!(captured.last_used > 0);
}
