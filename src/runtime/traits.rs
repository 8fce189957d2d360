//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor and dispatcher with mock
//! implementations.

use crate::db::{CatalogStats, Category, Database, DbError, DbResult, Item, ItemUpdate, NewItem};
use crate::messenger::{ChatId, MessageRef, MessengerError, Reply, Update, UserId};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Store failures as the conversation layer sees them
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Invalid value: {0}")]
    Invalid(String),
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl From<DbError> for CatalogError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ItemNotFound(id) => CatalogError::NotFound(id),
            DbError::CategoryExists(name) => CatalogError::Conflict(name),
            DbError::CategoryNotFound(name) => CatalogError::UnknownCategory(name),
            DbError::InvalidPrice(price) => CatalogError::Invalid(format!("price {price}")),
            DbError::Sqlite(_) | DbError::LockPoisoned => {
                CatalogError::Unavailable(err.to_string())
            }
        }
    }
}

/// Persistent catalog of items and categories
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All items in insertion order
    async fn list_items(&self) -> CatalogResult<Vec<Item>>;

    /// All items by name (byte order), ties in insertion order
    async fn list_items_sorted(&self) -> CatalogResult<Vec<Item>>;

    async fn list_categories(&self) -> CatalogResult<Vec<String>>;

    async fn items_in_category(&self, name: &str) -> CatalogResult<Vec<Item>>;

    /// Case-insensitive substring match on item names
    async fn search_items(&self, term: &str) -> CatalogResult<Vec<Item>>;

    async fn get_item(&self, id: &str) -> CatalogResult<Item>;

    /// Insert `item` under its own id; an id already stored returns the
    /// stored item
    async fn insert_item(&self, item: NewItem) -> CatalogResult<Item>;

    async fn update_item(&self, id: &str, update: ItemUpdate) -> CatalogResult<Item>;

    async fn delete_item(&self, id: &str) -> CatalogResult<()>;

    /// Insert a category under `id`; an id already stored returns the stored
    /// category
    async fn insert_category(&self, id: &str, name: &str) -> CatalogResult<Category>;

    async fn stats(&self) -> CatalogResult<CatalogStats>;
}

/// Outbound side of the chat transport
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<MessageRef, MessengerError>;

    /// Replace the content of `message`; transports that cannot edit may send
    /// a new message instead
    async fn edit_or_replace(
        &self,
        message: MessageRef,
        reply: &Reply,
    ) -> Result<MessageRef, MessengerError>;

    /// Stop the client's loading indicator on a pressed button
    async fn acknowledge(&self, callback_id: &str) -> Result<(), MessengerError>;
}

/// Decides who may use privileged actions
pub trait AccessPolicy: Send + Sync {
    fn is_privileged(&self, user_id: UserId) -> bool;
}

/// Consumer of inbound updates
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: Update);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CatalogStore + ?Sized> CatalogStore for Arc<T> {
    async fn list_items(&self) -> CatalogResult<Vec<Item>> {
        (**self).list_items().await
    }

    async fn list_items_sorted(&self) -> CatalogResult<Vec<Item>> {
        (**self).list_items_sorted().await
    }

    async fn list_categories(&self) -> CatalogResult<Vec<String>> {
        (**self).list_categories().await
    }

    async fn items_in_category(&self, name: &str) -> CatalogResult<Vec<Item>> {
        (**self).items_in_category(name).await
    }

    async fn search_items(&self, term: &str) -> CatalogResult<Vec<Item>> {
        (**self).search_items(term).await
    }

    async fn get_item(&self, id: &str) -> CatalogResult<Item> {
        (**self).get_item(id).await
    }

    async fn insert_item(&self, item: NewItem) -> CatalogResult<Item> {
        (**self).insert_item(item).await
    }

    async fn update_item(&self, id: &str, update: ItemUpdate) -> CatalogResult<Item> {
        (**self).update_item(id, update).await
    }

    async fn delete_item(&self, id: &str) -> CatalogResult<()> {
        (**self).delete_item(id).await
    }

    async fn insert_category(&self, id: &str, name: &str) -> CatalogResult<Category> {
        (**self).insert_category(id, name).await
    }

    async fn stats(&self) -> CatalogResult<CatalogStats> {
        (**self).stats().await
    }
}

#[async_trait]
impl<T: Messenger + ?Sized> Messenger for Arc<T> {
    async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<MessageRef, MessengerError> {
        (**self).send(chat_id, reply).await
    }

    async fn edit_or_replace(
        &self,
        message: MessageRef,
        reply: &Reply,
    ) -> Result<MessageRef, MessengerError> {
        (**self).edit_or_replace(message, reply).await
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), MessengerError> {
        (**self).acknowledge(callback_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use `Database` as `CatalogStore`
///
/// SQLite calls block, so each one runs on the blocking pool and is bounded by
/// `timeout`. A timed-out call surfaces as `Unavailable`; the blocking task is
/// left to finish on its own.
#[derive(Clone)]
pub struct DatabaseCatalog {
    db: Database,
    timeout: Duration,
}

impl DatabaseCatalog {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> CatalogResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || f(&db));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(|e| {
                let err = CatalogError::from(e);
                if matches!(err, CatalogError::Unavailable(_)) {
                    tracing::error!(op, error = %err, "Catalog operation failed");
                }
                err
            }),
            Ok(Err(join_err)) => {
                tracing::error!(op, error = %join_err, "Catalog task panicked");
                Err(CatalogError::Unavailable(format!("{op}: {join_err}")))
            }
            Err(_) => {
                tracing::warn!(op, timeout = ?self.timeout, "Catalog operation timed out");
                Err(CatalogError::Unavailable(format!("{op} timed out")))
            }
        }
    }
}

#[async_trait]
impl CatalogStore for DatabaseCatalog {
    async fn list_items(&self) -> CatalogResult<Vec<Item>> {
        self.run("list_items", |db| db.list_items()).await
    }

    async fn list_items_sorted(&self) -> CatalogResult<Vec<Item>> {
        self.run("list_items_sorted", |db| db.list_items_sorted())
            .await
    }

    async fn list_categories(&self) -> CatalogResult<Vec<String>> {
        self.run("list_categories", |db| db.list_categories()).await
    }

    async fn items_in_category(&self, name: &str) -> CatalogResult<Vec<Item>> {
        let name = name.to_string();
        self.run("items_in_category", move |db| db.items_in_category(&name))
            .await
    }

    async fn search_items(&self, term: &str) -> CatalogResult<Vec<Item>> {
        let term = term.to_string();
        self.run("search_items", move |db| db.search_by_name_substring(&term))
            .await
    }

    async fn get_item(&self, id: &str) -> CatalogResult<Item> {
        let id = id.to_string();
        self.run("get_item", move |db| db.get_item(&id)).await
    }

    async fn insert_item(&self, item: NewItem) -> CatalogResult<Item> {
        self.run("insert_item", move |db| db.insert_item(&item)).await
    }

    async fn update_item(&self, id: &str, update: ItemUpdate) -> CatalogResult<Item> {
        let id = id.to_string();
        self.run("update_item", move |db| db.update_item_field(&id, &update))
            .await
    }

    async fn delete_item(&self, id: &str) -> CatalogResult<()> {
        let id = id.to_string();
        self.run("delete_item", move |db| db.delete_item(&id)).await
    }

    async fn insert_category(&self, id: &str, name: &str) -> CatalogResult<Category> {
        let id = id.to_string();
        let name = name.to_string();
        self.run("insert_category", move |db| db.insert_category(&id, &name))
            .await
    }

    async fn stats(&self) -> CatalogResult<CatalogStats> {
        self.run("stats", |db| db.stats()).await
    }
}

/// Fixed set of privileged user ids
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: HashSet<UserId>,
}

impl AllowList {
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl AccessPolicy for AllowList {
    fn is_privileged(&self, user_id: UserId) -> bool {
        self.ids.contains(&user_id)
    }
}
