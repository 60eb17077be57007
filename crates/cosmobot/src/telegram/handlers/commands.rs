//! Command handlers: /start, /balance, /inventory, /buy, /open

use cosmocore::config;
use cosmocore::error::AppError;
use cosmocore::prizes::Rarity;
use teloxide::prelude::*;

use super::types::{HandlerDeps, HandlerError};
use crate::telegram::menu::{main_menu_keyboard, topup_keyboard};
use crate::telegram::payments::create_topup_invoice;
use crate::telegram::Bot;

/// Русское название тира редкости для сообщений пользователю.
pub fn rarity_label(rarity: Rarity) -> &'static str {
    match rarity {
        Rarity::Common => "Обычный",
        Rarity::Rare => "Редкий",
        Rarity::Epic => "Эпический",
        Rarity::Legendary => "Легендарный",
        Rarity::Mythic => "Мифический",
    }
}

/// /start — создаёт аккаунт и показывает главное меню с кнопкой мини-приложения.
pub async fn handle_start_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let username = msg.from.as_ref().and_then(|u| u.username.as_deref());
    let account = deps.ledger.account(msg.chat.id.0, username).await?;

    let text = format!(
        "🌌 Добро пожаловать в Cosmic Treasure Hunt!\n\n\
         Открывай кейсы, собирай космические призы и редкие подарки.\n\n\
         💎 Баланс: {}\n\
         🎁 Открытие кейса: {} 💎",
        account.crystals,
        *config::cases::COST_CRYSTALS
    );

    bot.send_message(msg.chat.id, text)
        .reply_markup(main_menu_keyboard())
        .await?;
    Ok(())
}

/// /balance — текущий баланс кристаллов.
pub async fn handle_balance_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let account = deps.ledger.account(msg.chat.id.0, None).await?;
    bot.send_message(
        msg.chat.id,
        format!(
            "💎 Кристаллы: {}\n✨ Звёздная пыль: {}",
            account.crystals, account.stardust
        ),
    )
    .await?;
    Ok(())
}

/// /inventory — последние выигранные призы.
pub async fn handle_inventory_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let entries = deps
        .ledger
        .inventory(msg.chat.id.0, config::cases::INVENTORY_PAGE_SIZE)
        .await?;

    if entries.is_empty() {
        bot.send_message(
            msg.chat.id,
            "🗃 Инвентарь пуст. Открой первый кейс командой /open!",
        )
        .await?;
        return Ok(());
    }

    let mut text = format!("🗃 Твои призы (последние {}):\n\n", entries.len());
    for entry in &entries {
        let gift_mark = if entry.gift_id.is_some() { " 🎁" } else { "" };
        text.push_str(&format!(
            "{} {} — {} ({} 💠){}\n",
            entry.emoji,
            entry.name,
            rarity_label(entry.rarity),
            entry.value,
            gift_mark
        ));
    }

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// /buy — меню пакетов пополнения.
pub async fn handle_buy_command(bot: &Bot, msg: &Message) -> Result<(), HandlerError> {
    bot.send_message(msg.chat.id, "💎 Выбери пакет кристаллов:")
        .reply_markup(topup_keyboard())
        .await?;
    Ok(())
}

/// /open и callback `case:open` — открывает кейс и отчитывается о результате.
pub async fn open_case_and_report(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let cost = *config::cases::COST_CRYSTALS;

    match deps.ledger.settle_case_open(chat_id.0, cost).await {
        Ok(outcome) => {
            let mut text = format!(
                "🎁 Кейс открыт!\n\n{} {}\n⭐ Редкость: {}\n💠 Ценность: {}\n",
                outcome.prize.emoji,
                outcome.prize.name,
                rarity_label(outcome.prize.rarity),
                outcome.prize.value
            );
            if outcome.gift_delivered {
                text.push_str("\n🎉 Тебе отправлен редкий подарок, проверь личные сообщения!\n");
            }
            text.push_str(&format!("\n💎 Баланс: {}", outcome.balance_after));

            bot.send_message(chat_id, text).reply_markup(main_menu_keyboard()).await?;
        }
        Err(AppError::InsufficientFunds { balance, required }) => {
            bot.send_message(
                chat_id,
                format!(
                    "😔 Недостаточно кристаллов: {} из {} 💎\n\nПополни баланс:",
                    balance, required
                ),
            )
            .reply_markup(topup_keyboard())
            .await?;
        }
        Err(e) => return Err(Box::new(e)),
    }

    Ok(())
}

/// Запускает покупку пакета: создаёт Stars-инвойс.
pub async fn start_topup(bot: &Bot, chat_id: ChatId, stars: u32) -> Result<(), HandlerError> {
    create_topup_invoice(bot, chat_id, stars).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_labels_cover_all_tiers() {
        for rarity in Rarity::ALL {
            assert!(!rarity_label(rarity).is_empty());
        }
        assert_eq!(rarity_label(Rarity::Mythic), "Мифический");
    }
}
