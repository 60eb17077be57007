//! Бот "Cosmic Treasure Hunt": телеграм-поверхность над ядром `cosmocore`.
//!
//! Здесь живут диспетчер teloxide, Stars-платежи, доставка подарков через
//! Bot API и HTTP-сервер мини-приложения.

pub mod cli;
pub mod telegram;

pub use telegram::bot::{create_bot, setup_bot_commands, Command};
pub use telegram::handlers::{schema, HandlerDeps, HandlerError};
pub use telegram::Bot;
