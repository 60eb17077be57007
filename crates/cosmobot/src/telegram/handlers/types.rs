//! Handler types and dependencies

use std::sync::Arc;

use cosmocore::db::DbPool;
use cosmocore::ledger::Ledger;
use teloxide::prelude::*;

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub ledger: Arc<Ledger>,
    pub bot_username: Option<String>,
    pub bot_id: UserId,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(db_pool: Arc<DbPool>, ledger: Arc<Ledger>, bot_username: Option<String>, bot_id: UserId) -> Self {
        Self {
            db_pool,
            ledger,
            bot_username,
            bot_id,
        }
    }
}
