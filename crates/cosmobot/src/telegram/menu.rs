//! Inline keyboards for the main menu and topup packs

use cosmocore::config;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, WebAppInfo};

/// Главное меню: кнопка мини-приложения (если настроен WEBAPP_URL),
/// открытие кейса и покупка кристаллов.
pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();

    if let Some(webapp_url) = config::WEBAPP_URL.as_ref() {
        if let Ok(url) = url::Url::parse(webapp_url) {
            rows.push(vec![InlineKeyboardButton::web_app(
                "🚀 Запустить Cosmic Treasure Hunt",
                WebAppInfo { url },
            )]);
        } else {
            log::warn!("Invalid WEBAPP_URL, skipping mini-app button: {}", webapp_url);
        }
    }

    rows.push(vec![InlineKeyboardButton::callback(
        format!("🎁 Открыть кейс ({} 💎)", *config::cases::COST_CRYSTALS),
        "case:open",
    )]);
    rows.push(vec![InlineKeyboardButton::callback(
        "💎 Купить кристаллы".to_string(),
        "topup:menu",
    )]);

    InlineKeyboardMarkup::new(rows)
}

/// Меню пополнения: по кнопке на каждый пакет из прайс-листа.
pub fn topup_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = config::prices::TOPUP_PACKS
        .iter()
        .map(|(stars, crystals)| {
            vec![InlineKeyboardButton::callback(
                format!("⭐ {} Stars → {} 💎", stars, crystals),
                format!("topup:{}", stars),
            )]
        })
        .collect();

    rows.push(vec![InlineKeyboardButton::callback("🔙 Назад".to_string(), "back:main")]);

    InlineKeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topup_keyboard_has_pack_per_price() {
        let keyboard = topup_keyboard();
        // one row per pack plus the back button
        assert_eq!(
            keyboard.inline_keyboard.len(),
            cosmocore::config::prices::TOPUP_PACKS.len() + 1
        );
    }

    #[test]
    fn test_main_menu_has_case_open_button() {
        let keyboard = main_menu_keyboard();
        let has_case_open = keyboard
            .inline_keyboard
            .iter()
            .flatten()
            .any(|b| matches!(&b.kind, teloxide::types::InlineKeyboardButtonKind::CallbackData(d) if d == "case:open"));
        assert!(has_case_open);
    }
}
