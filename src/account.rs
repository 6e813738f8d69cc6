//! Account store (§4.6): the persisted mapping of
//! `(owner_user_id, provider, provider_account_id) -> encrypted token`.
//!
//! Ownership is enforced at this boundary; no higher layer is trusted to do
//! the check alone (§4.6, §4.7 step 2).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// The closed set of supported vendors (currently just `{lifx}`, §3).
/// (De)serializes as its lowercase name so it round-trips through JSON and
/// the `accounts.provider` text column the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Lifx,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Lifx => "lifx",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Provider {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Provider {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        match s.as_str() {
            "lifx" => Ok(Provider::Lifx),
            other => Err(serde::de::Error::custom(format!(
                "unknown provider: {other}"
            ))),
        }
    }
}

/// The persistent record of one connected third-party lighting account.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub provider: Provider,
    pub provider_account_id: String,
    /// `nonce ‖ ciphertext ‖ tag` from [`crate::crypto::seal`]. Never
    /// surfaced to any caller outside this module and the device service.
    pub encrypted_token: Vec<u8>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account with `encrypted_token` stripped, safe to return to callers (§6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountProjection {
    pub id: Uuid,
    pub provider: String,
    pub provider_account_id: String,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountProjection {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id,
            provider: a.provider.as_str().to_string(),
            provider_account_id: a.provider_account_id.clone(),
            metadata: a.metadata.clone(),
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account not found")]
    NotFound,
    #[error("account already exists")]
    AlreadyExists,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(
        &self,
        owner: Uuid,
        provider: Provider,
        provider_account_id: String,
        encrypted_token: Vec<u8>,
        metadata: HashMap<String, Value>,
    ) -> Result<Account, StoreError>;

    async fn find_by_owner(&self, owner: Uuid) -> Result<Vec<Account>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Account, StoreError>;

    /// Removes the account only if `owner` matches; otherwise returns
    /// `NotFound` regardless of whether the id exists under a different
    /// owner (§4.6 — ownership checks must not leak existence).
    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<(), StoreError>;

    /// Readiness probe — a cheap round-trip confirming the backend is
    /// reachable (§6 `GET /ready`).
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Resolve an account and enforce ownership in one step (§4.7 pipeline
/// steps 1–2): a missing account and an account owned by someone else both
/// read as `NotFound` — same shape either way, so a caller can't probe for
/// an id's existence under another owner.
pub async fn resolve_owned_account(
    store: &dyn AccountStore,
    account_id: Uuid,
    caller: Uuid,
) -> Result<Account, crate::error::AppError> {
    let account = store.find_by_id(account_id).await?;
    if account.owner_user_id != caller {
        return Err(crate::error::AppError::NotFound);
    }
    Ok(account)
}

/// PostgreSQL-backed implementation via `sqlx`.
pub struct PgAccountStore {
    pool: sqlx::PgPool,
}

impl PgAccountStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create(
        &self,
        owner: Uuid,
        provider: Provider,
        provider_account_id: String,
        encrypted_token: Vec<u8>,
        metadata: HashMap<String, Value>,
    ) -> Result<Account, StoreError> {
        let metadata_json = Value::Object(metadata.into_iter().collect());
        let row = sqlx::query_as!(
            AccountRow,
            r#"
            INSERT INTO accounts (id, owner_user_id, provider, provider_account_id, encrypted_token, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now(), now())
            RETURNING id, owner_user_id, provider, provider_account_id, encrypted_token, metadata, created_at, updated_at
            "#,
            Uuid::new_v4(),
            owner,
            provider.as_str(),
            provider_account_id,
            encrypted_token,
            metadata_json,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StoreError::AlreadyExists
            }
            _ => StoreError::Backend(e.into()),
        })?;

        row.try_into()
    }

    async fn find_by_owner(&self, owner: Uuid) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query_as!(
            AccountRow,
            r#"
            SELECT id, owner_user_id, provider, provider_account_id, encrypted_token, metadata, created_at, updated_at
            FROM accounts WHERE owner_user_id = $1 ORDER BY created_at DESC
            "#,
            owner,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let row = sqlx::query_as!(
            AccountRow,
            r#"
            SELECT id, owner_user_id, provider, provider_account_id, encrypted_token, metadata, created_at, updated_at
            FROM accounts WHERE id = $1
            "#,
            id,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?
        .ok_or(StoreError::NotFound)?;

        row.try_into()
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query!(
            "DELETE FROM accounts WHERE id = $1 AND owner_user_id = $2",
            id,
            owner,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query!("SELECT 1 as one")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.into()))?;
        Ok(())
    }
}

/// Raw row shape from `sqlx::query_as!`, converted into [`Account`] so the
/// domain type doesn't carry sqlx-specific representations (e.g. `provider`
/// as `String` rather than [`Provider`]).
struct AccountRow {
    id: Uuid,
    owner_user_id: Uuid,
    provider: String,
    provider_account_id: String,
    encrypted_token: Vec<u8>,
    metadata: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, StoreError> {
        let provider = match row.provider.as_str() {
            "lifx" => Provider::Lifx,
            other => {
                return Err(StoreError::Backend(anyhow::anyhow!(
                    "unknown provider in database row: {other}"
                )))
            }
        };
        let metadata = match row.metadata {
            Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        Ok(Account {
            id: row.id,
            owner_user_id: row.owner_user_id,
            provider,
            provider_account_id: row.provider_account_id,
            encrypted_token: row.encrypted_token,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// In-memory test double — used by unit and integration tests so the
/// pipeline can be exercised without a database (§10.5).
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: Mutex<Vec<Account>>,
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create(
        &self,
        owner: Uuid,
        provider: Provider,
        provider_account_id: String,
        encrypted_token: Vec<u8>,
        metadata: HashMap<String, Value>,
    ) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        let exists = accounts.iter().any(|a| {
            a.owner_user_id == owner
                && a.provider == provider
                && a.provider_account_id == provider_account_id
        });
        if exists {
            return Err(StoreError::AlreadyExists);
        }
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            owner_user_id: owner,
            provider,
            provider_account_id,
            encrypted_token,
            metadata,
            created_at: now,
            updated_at: now,
        };
        accounts.push(account.clone());
        Ok(account)
    }

    async fn find_by_owner(&self, owner: Uuid) -> Result<Vec<Account>, StoreError> {
        let accounts = self.accounts.lock().unwrap();
        let mut found: Vec<Account> = accounts
            .iter()
            .filter(|a| a.owner_user_id == owner)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Account, StoreError> {
        let accounts = self.accounts.lock().unwrap();
        accounts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: Uuid, owner: Uuid) -> Result<(), StoreError> {
        let mut accounts = self.accounts.lock().unwrap();
        let before = accounts.len();
        accounts.retain(|a| !(a.id == id && a.owner_user_id == owner));
        if accounts.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = InMemoryAccountStore::default();
        let owner = Uuid::new_v4();
        store
            .create(owner, Provider::Lifx, "loc-1".into(), vec![1, 2, 3], HashMap::new())
            .await
            .unwrap();
        let err = store
            .create(owner, Provider::Lifx, "loc-1".into(), vec![1, 2, 3], HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn delete_requires_matching_owner() {
        let store = InMemoryAccountStore::default();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let account = store
            .create(owner, Provider::Lifx, "loc-1".into(), vec![], HashMap::new())
            .await
            .unwrap();

        let err = store.delete(account.id, other).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        // Account persists after the mismatched-owner delete attempt.
        assert!(store.find_by_id(account.id).await.is_ok());

        store.delete(account.id, owner).await.unwrap();
        assert!(matches!(
            store.find_by_id(account.id).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn find_by_owner_orders_by_created_at_desc() {
        let store = InMemoryAccountStore::default();
        let owner = Uuid::new_v4();
        store
            .create(owner, Provider::Lifx, "loc-1".into(), vec![], HashMap::new())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .create(owner, Provider::Lifx, "loc-2".into(), vec![], HashMap::new())
            .await
            .unwrap();

        let found = store.find_by_owner(owner).await.unwrap();
        assert_eq!(found[0].provider_account_id, "loc-2");
        assert_eq!(found[1].provider_account_id, "loc-1");
    }
}
