//! Webhook ingress and health endpoint

mod handlers;
mod types;

pub use handlers::create_router;

use crate::messenger::Update;
use crate::runtime::SessionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub updates: mpsc::Sender<Update>,
    pub registry: Arc<SessionRegistry>,
    /// Path segment Telegram must present on every webhook call
    pub secret: Arc<str>,
}

impl AppState {
    pub fn new(
        updates: mpsc::Sender<Update>,
        registry: Arc<SessionRegistry>,
        secret: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            updates,
            registry,
            secret: secret.into(),
        }
    }
}
