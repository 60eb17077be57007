//! Callback query router for the inline menu

use teloxide::prelude::*;

use super::commands::{open_case_and_report, start_topup};
use super::types::{HandlerDeps, HandlerError};
use crate::telegram::menu::{main_menu_keyboard, topup_keyboard};
use crate::telegram::Bot;

/// Разбирает callback data инлайн-меню и выполняет действие.
///
/// Поддерживаемые значения: `case:open`, `topup:menu`, `topup:<stars>`,
/// `back:main`. Неизвестные значения логируются и игнорируются.
pub async fn handle_menu_callback(bot: Bot, q: CallbackQuery, deps: HandlerDeps) -> Result<(), HandlerError> {
    let data = match q.data.as_deref() {
        Some(d) => d,
        None => return Ok(()),
    };

    // Убираем "часики" на кнопке сразу
    bot.answer_callback_query(q.id.clone()).await?;

    let chat_id = match q.message.as_ref().map(|m| m.chat().id) {
        Some(id) => id,
        None => {
            log::warn!("Callback {} without accessible message from user {}", data, q.from.id);
            return Ok(());
        }
    };

    log::info!("🎯 Callback from chat {}: {}", chat_id, data);

    match data {
        "case:open" => {
            open_case_and_report(&bot, chat_id, &deps).await?;
        }
        "topup:menu" => {
            bot.send_message(chat_id, "💎 Выбери пакет кристаллов:")
                .reply_markup(topup_keyboard())
                .await?;
        }
        "back:main" => {
            bot.send_message(chat_id, "🌌 Главное меню:")
                .reply_markup(main_menu_keyboard())
                .await?;
        }
        d if d.starts_with("topup:") => match d.trim_start_matches("topup:").parse::<u32>() {
            Ok(stars) => start_topup(&bot, chat_id, stars).await?,
            Err(_) => log::warn!("Malformed topup callback: {}", d),
        },
        other => {
            log::warn!("Unknown callback data: {}", other);
        }
    }

    Ok(())
}
