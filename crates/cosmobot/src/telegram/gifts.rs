//! Gift delivery through the raw Bot API
//!
//! teloxide does not cover the gift endpoints yet, so this talks to
//! `getAvailableGifts` / `sendGift` directly over reqwest. Production
//! implementation of the `GiftSender` collaborator; tests use a stub.

use async_trait::async_trait;
use cosmocore::error::{AppError, AppResult};
use cosmocore::gifts::GiftSender;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvailableGifts {
    gifts: Vec<GiftInfo>,
}

#[derive(Debug, Deserialize)]
struct GiftInfo {
    id: String,
    /// Остаток лимитированного подарка; None у безлимитных
    remaining_count: Option<i64>,
}

/// Продакшн-доставка подарков: прямые вызовы Bot API.
pub struct TelegramGiftSender {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramGiftSender {
    pub fn new(bot_token: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::GiftDelivery(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: format!("https://api.telegram.org/bot{}", bot_token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }
}

#[async_trait]
impl GiftSender for TelegramGiftSender {
    async fn list_available(&self) -> AppResult<Vec<String>> {
        let response: ApiResponse<AvailableGifts> = self
            .client
            .get(self.method_url("getAvailableGifts"))
            .send()
            .await
            .map_err(|e| AppError::GiftDelivery(format!("getAvailableGifts request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::GiftDelivery(format!("getAvailableGifts bad response: {}", e)))?;

        if !response.ok {
            return Err(AppError::GiftDelivery(format!(
                "getAvailableGifts rejected: {}",
                response.description.unwrap_or_else(|| "no description".to_string())
            )));
        }

        let gifts = response.result.map(|r| r.gifts).unwrap_or_default();
        let ids: Vec<String> = gifts
            .into_iter()
            .filter(|g| g.remaining_count.map(|n| n > 0).unwrap_or(true))
            .map(|g| g.id)
            .collect();

        log::info!("Bot API reports {} deliverable gift(s)", ids.len());
        Ok(ids)
    }

    async fn deliver(&self, gift_id: &str, telegram_id: i64) -> AppResult<()> {
        let body = serde_json::json!({
            "user_id": telegram_id,
            "gift_id": gift_id,
        });

        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(self.method_url("sendGift"))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::GiftDelivery(format!("sendGift request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| AppError::GiftDelivery(format!("sendGift bad response: {}", e)))?;

        if !response.ok {
            return Err(AppError::GiftDelivery(format!(
                "sendGift rejected for gift {}: {}",
                gift_id,
                response.description.unwrap_or_else(|| "no description".to_string())
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url() {
        let sender = TelegramGiftSender::new("123:abc").unwrap();
        assert_eq!(
            sender.method_url("sendGift"),
            "https://api.telegram.org/bot123:abc/sendGift"
        );
    }

    #[test]
    fn test_available_gifts_parsing() {
        let raw = r#"{"ok":true,"result":{"gifts":[
            {"id":"g1","remaining_count":3},
            {"id":"g2","remaining_count":0},
            {"id":"g3"}
        ]}}"#;
        let parsed: ApiResponse<AvailableGifts> = serde_json::from_str(raw).unwrap();
        assert!(parsed.ok);
        let gifts = parsed.result.unwrap().gifts;
        assert_eq!(gifts.len(), 3);
        // sold-out gifts are filtered by list_available
        let deliverable: Vec<&str> = gifts
            .iter()
            .filter(|g| g.remaining_count.map(|n| n > 0).unwrap_or(true))
            .map(|g| g.id.as_str())
            .collect();
        assert_eq!(deliverable, ["g1", "g3"]);
    }

    #[test]
    fn test_error_response_parsing() {
        let raw = r#"{"ok":false,"description":"Bad Request: STARGIFT_USAGE_LIMITED"}"#;
        let parsed: ApiResponse<AvailableGifts> = serde_json::from_str(raw).unwrap();
        assert!(!parsed.ok);
        assert!(parsed.description.unwrap().contains("STARGIFT"));
    }
}
