//! Telegram Stars payments for crystal topups
//!
//! Invoice creation and successful-payment settlement. The invoice payload is
//! `topup:<stars>:<user_id>`; crediting is idempotent per
//! `telegram_payment_charge_id`, so a redelivered confirmation never credits
//! twice.

use std::sync::Arc;

use cosmocore::config;
use cosmocore::ledger::{CreditOutcome, Ledger};
use cosmocore::metrics;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, LabeledPrice};
use teloxide::RequestError;
use url::Url;

use crate::telegram::Bot;

/// Создает инвойс для покупки кристаллов через Telegram Stars
///
/// Одноразовый платёж (без подписки). Валюта всегда XTR.
pub async fn create_topup_invoice(bot: &Bot, chat_id: ChatId, stars: u32) -> ResponseResult<Message> {
    let crystals = match config::prices::pack_crystals(stars) {
        Some(c) => c,
        None => {
            log::error!("❌ Unknown topup pack requested: {} Stars", stars);
            return Err(RequestError::from(std::sync::Arc::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Unknown topup pack",
            ))));
        }
    };

    let payload = format!("topup:{}:{}", stars, chat_id.0);
    log::info!("📦 Invoice payload: {}", payload);

    let title = format!("💎 {} кристаллов", crystals);
    let description = format!(
        "Пакет из {} кристаллов для открытия кейсов в Cosmic Treasure Hunt.\nОдноразовый платёж {} Stars.",
        crystals, stars
    );

    log::info!(
        "💰 Creating topup invoice link: {} Stars -> {} crystals (chat_id: {})",
        stars,
        crystals,
        chat_id.0
    );

    let invoice_link = bot
        .create_invoice_link(
            title,
            description.clone(),
            payload,
            "XTR".to_string(), // Только XTR (Telegram Stars)
            vec![LabeledPrice::new(format!("{} кристаллов", crystals), stars)],
        )
        .await?;

    log::info!("✅ Invoice link created successfully: {}", invoice_link);

    let invoice_url = Url::parse(&invoice_link).map_err(|e| {
        RequestError::from(std::sync::Arc::new(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid invoice URL: {}", e),
        )))
    })?;

    let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
        format!("💳 Оплатить {} ⭐", stars),
        invoice_url,
    )]]);

    bot.send_message(
        chat_id,
        format!("💫 Покупка {} 💎\n\n{}\n\n✨ Нажми на кнопку ниже для оплаты:", crystals, description),
    )
    .reply_markup(keyboard)
    .await
}

/// Разбирает payload инвойса `topup:<stars>:<user_id>`.
pub fn parse_topup_payload(payload: &str) -> Option<(u32, i64)> {
    let parts: Vec<&str> = payload.split(':').collect();
    if parts.len() != 3 || parts[0] != "topup" {
        return None;
    }
    let stars = parts[1].parse::<u32>().ok()?;
    let user_id = parts[2].parse::<i64>().ok()?;
    Some((stars, user_id))
}

/// Обрабатывает успешный платёж: начисляет кристаллы и подтверждает покупку
/// пользователю. Повторная доставка того же платежа ничего не меняет.
pub async fn handle_successful_payment(bot: &Bot, msg: &Message, ledger: Arc<Ledger>) -> ResponseResult<()> {
    let payment = match msg.successful_payment() {
        Some(p) => p,
        None => return Ok(()),
    };

    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("💳 SUCCESSFUL PAYMENT EVENT");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("  • Currency: {}", payment.currency);
    log::info!("  • Total amount: {}", payment.total_amount);
    log::info!("  • Invoice payload: {}", payment.invoice_payload);
    log::info!("  • Telegram payment charge ID: {}", payment.telegram_payment_charge_id.0);
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let (stars, user_id) = match parse_topup_payload(&payment.invoice_payload) {
        Some(parsed) => parsed,
        None => {
            log::error!("❌ Unknown payment payload, not crediting: {}", payment.invoice_payload);
            return Ok(());
        }
    };

    let crystals = config::prices::crystals_for_stars(stars);
    let charge_id = payment.telegram_payment_charge_id.0.clone();

    match ledger.credit_purchase(user_id, crystals, &charge_id).await {
        Ok(CreditOutcome::Credited { balance_after }) => {
            metrics::REVENUE_STARS_TOTAL.inc_by(u64::from(stars));
            log::info!(
                "✅ Topup settled: user {} +{} crystals ({} Stars), balance {}",
                user_id,
                crystals,
                stars,
                balance_after
            );
            bot.send_message(
                msg.chat.id,
                format!("✅ Оплата получена!\n\n+{} 💎\nТекущий баланс: {} 💎", crystals, balance_after),
            )
            .await?;
        }
        Ok(CreditOutcome::AlreadyApplied) => {
            log::warn!("Duplicate payment confirmation for charge {}, already credited", charge_id);
        }
        Err(e) => {
            log::error!("❌ Failed to credit topup for user {}: {}", user_id, e);
            return Err(RequestError::from(std::sync::Arc::new(std::io::Error::other(
                e.to_string(),
            ))));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_topup_payload() {
        assert_eq!(parse_topup_payload("topup:100:42"), Some((100, 42)));
        assert_eq!(parse_topup_payload("topup:50:123456789"), Some((50, 123456789)));
    }

    #[test]
    fn test_parse_rejects_foreign_payloads() {
        assert_eq!(parse_topup_payload("subscription:premium:42"), None);
        assert_eq!(parse_topup_payload("topup:100"), None);
        assert_eq!(parse_topup_payload("topup:x:42"), None);
        assert_eq!(parse_topup_payload(""), None);
    }

    #[test]
    fn test_payload_roundtrip() {
        let payload = format!("topup:{}:{}", 250, 99);
        assert_eq!(parse_topup_payload(&payload), Some((250, 99)));
    }
}
