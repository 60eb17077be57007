//! Cosmocore - core library for the Cosmic Treasure Hunt Telegram bot
//!
//! Everything that does not talk to Telegram lives here: the balance and
//! inventory ledger, the weighted prize draw engine, the scarce gift pool,
//! SQLite persistence, configuration, and metrics.
//!
//! # Module Structure
//!
//! - `config`: environment-driven configuration constants
//! - `error`: centralized `AppError` / `AppResult`
//! - `logging`: console + file logger initialization
//! - `db`: accounts, inventory, and payment-credit persistence
//! - `prizes`: prize catalog and the cumulative-table draw engine
//! - `gifts`: gift pool and the gift-delivery collaborator trait
//! - `ledger`: balance settlement (case open, purchase credit)
//! - `metrics`: prometheus counters

pub mod config;
pub mod db;
pub mod error;
pub mod gifts;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod prizes;

// Re-export commonly used types for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use error::{AppError, AppResult};
pub use gifts::{GiftPool, GiftSender};
pub use ledger::{CaseOutcome, CreditOutcome, Ledger};
pub use prizes::{PrizeDef, Rarity};
