//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use super::SessionRegistry;
use crate::db::{CatalogStats, Category, Database, Item, ItemUpdate, NewItem};
use crate::dispatcher::{Dispatcher, Route};
use crate::messenger::{ChatId, MessageRef, MessengerError, Reply, Update, UserId};
use crate::runtime::ConversationRuntime;
use crate::state_machine::Conversation;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Recording Messenger
// ============================================================================

/// One call made against the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Sent { chat_id: ChatId, reply: Reply },
    Edited { message: MessageRef, reply: Reply },
    Acknowledged(String),
}

impl Outgoing {
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Outgoing::Sent { reply, .. } | Outgoing::Edited { reply, .. } => Some(reply),
            Outgoing::Acknowledged(_) => None,
        }
    }
}

/// Messenger that records everything instead of talking to a server
pub struct RecordingMessenger {
    outgoing: Mutex<Vec<Outgoing>>,
    next_message_id: AtomicI64,
}

#[allow(dead_code)]
impl RecordingMessenger {
    pub fn new() -> Self {
        Self {
            outgoing: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(1000),
        }
    }

    pub fn outgoing(&self) -> Vec<Outgoing> {
        self.outgoing.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.outgoing()
            .iter()
            .filter_map(Outgoing::reply)
            .cloned()
            .collect()
    }

    pub fn last_reply(&self) -> Option<Reply> {
        self.replies().pop()
    }

    /// Text of the last reply, or empty if nothing was sent
    pub fn last_text(&self) -> String {
        self.last_reply().map(|r| r.text).unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.replies().into_iter().map(|r| r.text).collect()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.outgoing()
            .into_iter()
            .filter_map(|o| match o {
                Outgoing::Acknowledged(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.outgoing.lock().unwrap().clear();
    }
}

impl Default for RecordingMessenger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<MessageRef, MessengerError> {
        self.outgoing.lock().unwrap().push(Outgoing::Sent {
            chat_id,
            reply: reply.clone(),
        });
        Ok(MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn edit_or_replace(
        &self,
        message: MessageRef,
        reply: &Reply,
    ) -> Result<MessageRef, MessengerError> {
        self.outgoing.lock().unwrap().push(Outgoing::Edited {
            message,
            reply: reply.clone(),
        });
        Ok(message)
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), MessengerError> {
        self.outgoing
            .lock()
            .unwrap()
            .push(Outgoing::Acknowledged(callback_id.to_string()));
        Ok(())
    }
}

// ============================================================================
// Failing Catalog
// ============================================================================

/// Wraps a catalog and fails reads or writes on demand
pub struct UnavailableCatalog<C> {
    inner: C,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    lose_write_replies: AtomicBool,
}

#[allow(dead_code)]
impl<C: CatalogStore> UnavailableCatalog<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            lose_write_replies: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Apply writes but report them unavailable, like a timeout that fires
    /// after the store committed
    pub fn lose_write_replies(&self, lose: bool) {
        self.lose_write_replies.store(lose, Ordering::SeqCst);
    }

    fn check_read(&self) -> CatalogResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> CatalogResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    fn settle_write<T>(&self, result: CatalogResult<T>) -> CatalogResult<T> {
        if self.lose_write_replies.load(Ordering::SeqCst) {
            result?;
            return Err(CatalogError::Unavailable("write timed out".to_string()));
        }
        result
    }
}

#[async_trait]
impl<C: CatalogStore> CatalogStore for UnavailableCatalog<C> {
    async fn list_items(&self) -> CatalogResult<Vec<Item>> {
        self.check_read()?;
        self.inner.list_items().await
    }

    async fn list_items_sorted(&self) -> CatalogResult<Vec<Item>> {
        self.check_read()?;
        self.inner.list_items_sorted().await
    }

    async fn list_categories(&self) -> CatalogResult<Vec<String>> {
        self.check_read()?;
        self.inner.list_categories().await
    }

    async fn items_in_category(&self, name: &str) -> CatalogResult<Vec<Item>> {
        self.check_read()?;
        self.inner.items_in_category(name).await
    }

    async fn search_items(&self, term: &str) -> CatalogResult<Vec<Item>> {
        self.check_read()?;
        self.inner.search_items(term).await
    }

    async fn get_item(&self, id: &str) -> CatalogResult<Item> {
        self.check_read()?;
        self.inner.get_item(id).await
    }

    async fn insert_item(&self, item: NewItem) -> CatalogResult<Item> {
        self.check_write()?;
        self.settle_write(self.inner.insert_item(item).await)
    }

    async fn update_item(&self, id: &str, update: ItemUpdate) -> CatalogResult<Item> {
        self.check_write()?;
        self.settle_write(self.inner.update_item(id, update).await)
    }

    async fn delete_item(&self, id: &str) -> CatalogResult<()> {
        self.check_write()?;
        self.inner.delete_item(id).await
    }

    async fn insert_category(&self, id: &str, name: &str) -> CatalogResult<Category> {
        self.check_write()?;
        self.settle_write(self.inner.insert_category(id, name).await)
    }

    async fn stats(&self) -> CatalogResult<CatalogStats> {
        self.check_read()?;
        self.inner.stats().await
    }
}

// ============================================================================
// Test Bot
// ============================================================================

/// Privileged user in [`TestBot`]
pub const ADMIN: UserId = UserId(1);
/// Unprivileged user in [`TestBot`]
pub const VISITOR: UserId = UserId(2);
/// Second privileged user in [`TestBot`]
pub const CO_ADMIN: UserId = UserId(4);

pub type TestCatalog = UnavailableCatalog<DatabaseCatalog>;
pub type TestDispatcher = Dispatcher<TestCatalog, RecordingMessenger, AllowList>;

/// Fully wired bot over an in-memory store and a recording transport
pub struct TestBot {
    pub registry: Arc<SessionRegistry>,
    pub catalog: Arc<TestCatalog>,
    pub messenger: Arc<RecordingMessenger>,
    pub dispatcher: TestDispatcher,
}

#[allow(dead_code)]
impl TestBot {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let catalog = Arc::new(UnavailableCatalog::new(DatabaseCatalog::new(
            db,
            Duration::from_secs(5),
        )));
        let messenger = Arc::new(RecordingMessenger::new());
        let registry = Arc::new(SessionRegistry::new());
        let runtime = ConversationRuntime::new(catalog.clone(), messenger.clone());
        let dispatcher = Dispatcher::new(registry.clone(), runtime, AllowList::new([ADMIN, CO_ADMIN]));
        Self {
            registry,
            catalog,
            messenger,
            dispatcher,
        }
    }

    fn chat(user: UserId) -> ChatId {
        ChatId(user.0)
    }

    /// Message text or `/command` from `user`
    pub async fn text(&self, user: UserId, text: &str) -> Route {
        self.dispatcher
            .dispatch(Update::from_text(user, Self::chat(user), text))
            .await
    }

    /// Button press from `user` on a previously sent menu
    pub async fn press(&self, user: UserId, payload: &str) -> Route {
        let chat_id = Self::chat(user);
        let pressed = MessageRef {
            chat_id,
            message_id: 1,
        };
        self.dispatcher
            .dispatch(Update::button(
                user,
                chat_id,
                payload,
                Some(format!("cb-{payload}")),
                Some(pressed),
            ))
            .await
    }

    pub async fn conversation(&self, user: UserId) -> Option<Conversation> {
        self.registry.get(user).await
    }

    pub fn last_text(&self) -> String {
        self.messenger.last_text()
    }

    /// Insert an item directly, bypassing the bot
    pub async fn seed_item(&self, name: &str, price: &str, category: &str) -> Item {
        self.catalog
            .insert_item(NewItem {
                id: uuid::Uuid::new_v4().to_string(),
                name: name.to_string(),
                price: price.parse().unwrap(),
                category: category.to_string(),
                create_category: false,
                added_at: chrono::Utc::now(),
            })
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_messenger() {
        let messenger = RecordingMessenger::new();
        let first = messenger.send(ChatId(1), &Reply::text("a")).await.unwrap();
        let second = messenger.send(ChatId(1), &Reply::text("b")).await.unwrap();
        assert_ne!(first.message_id, second.message_id);

        messenger.acknowledge("cb-1").await.unwrap();
        messenger.edit_or_replace(first, &Reply::text("c")).await.unwrap();
        assert_eq!(messenger.texts(), vec!["a", "b", "c"]);
        assert_eq!(messenger.acknowledged(), vec!["cb-1"]);

        messenger.clear();
        assert!(messenger.outgoing().is_empty());
        assert_eq!(messenger.last_text(), "");
    }

    #[tokio::test]
    async fn test_unavailable_catalog_toggles() {
        let bot = TestBot::new();
        bot.catalog.fail_reads(true);
        assert!(matches!(
            bot.catalog.list_categories().await,
            Err(CatalogError::Unavailable(_))
        ));
        bot.catalog.fail_reads(false);
        assert_eq!(bot.catalog.list_categories().await.unwrap().len(), 5);
    }
}
