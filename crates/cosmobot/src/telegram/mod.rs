//! Telegram bot integration and handlers

pub mod bot;
pub mod gifts;
pub mod handlers;
pub mod menu;
pub mod payments;
pub mod webapp;
pub mod webapp_auth;

pub use teloxide::Bot;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use gifts::TelegramGiftSender;
pub use menu::{main_menu_keyboard, topup_keyboard};
pub use webapp::{create_webapp_router, run_webapp_server};
