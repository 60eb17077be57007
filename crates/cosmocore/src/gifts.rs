//! Scarce gift pool and the gift-delivery collaborator
//!
//! The pool is a process-wide cache of Telegram gift identifiers, refreshed
//! once at startup. Taking an id is atomic (single lock-protected pop) so two
//! concurrent non-Common draws can never claim the same id. Delivery is
//! best-effort: a failed delivery puts the id back and the case-open result
//! still reports success with `gift_delivered = false`.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::config;
use crate::error::AppResult;

/// Внешний коллаборатор доставки подарков (в проде — Bot API, в тестах —
/// заглушка).
#[async_trait]
pub trait GiftSender: Send + Sync {
    /// List currently available gift identifiers.
    async fn list_available(&self) -> AppResult<Vec<String>>;

    /// Deliver gift `gift_id` to the account `telegram_id`. No retry.
    async fn deliver(&self, gift_id: &str, telegram_id: i64) -> AppResult<()>;
}

/// Process-wide cache of scarce gift identifiers with atomic take-one
/// semantics. First-available only, no consumption-order guarantee.
pub struct GiftPool {
    ids: Mutex<VecDeque<String>>,
}

impl GiftPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            ids: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a pool pre-seeded with ids (tests and startup refresh).
    pub fn with_ids(ids: Vec<String>) -> Self {
        Self {
            ids: Mutex::new(ids.into()),
        }
    }

    /// Refresh the pool from the delivery collaborator. Called once at
    /// startup; a failed fetch leaves the pool empty and the bot degrades to
    /// prize-only draws.
    pub async fn refresh(&self, sender: &dyn GiftSender) {
        if *config::gifts::DISABLED {
            log::info!("Gift pool disabled (GIFTS_DISABLED=1)");
            return;
        }

        match sender.list_available().await {
            Ok(mut available) => {
                available.truncate(config::gifts::POOL_CAP);
                let mut ids = self.ids.lock().await;
                ids.clear();
                ids.extend(available);
                log::info!("Gift pool refreshed: {} id(s) available", ids.len());
            }
            Err(e) => {
                log::warn!("Failed to refresh gift pool, continuing without gifts: {}", e);
            }
        }
    }

    /// Atomically take the first available id, if any.
    pub async fn take(&self) -> Option<String> {
        self.ids.lock().await.pop_front()
    }

    /// Return an id after a failed delivery so the scarce inventory is not
    /// burned by a transient Bot API error.
    pub async fn put_back(&self, gift_id: String) {
        self.ids.lock().await.push_front(gift_id);
    }

    /// Number of ids currently available.
    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    /// Whether the pool is empty.
    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }
}

impl Default for GiftPool {
    fn default() -> Self {
        Self::new()
    }
}
