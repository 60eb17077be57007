use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Максимальный возраст init data в секундах (24 часа)
const MAX_INIT_DATA_AGE_SECS: i64 = 86_400;

fn parse_init_data(init_data: &str) -> HashMap<String, String> {
    init_data
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(key), Some(value)) => {
                    let decoded_value = urlencoding::decode(value).ok()?;
                    Some((key.to_string(), decoded_value.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

fn user_id_from_params(params: &HashMap<String, String>) -> Result<i64> {
    let user_json = params.get("user").ok_or_else(|| anyhow!("Missing user parameter"))?;

    let user: serde_json::Value =
        serde_json::from_str(user_json).map_err(|e| anyhow!("Failed to parse user JSON: {}", e))?;

    user.get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("Missing user id in user JSON"))
}

/// Валидация Telegram Web App init data
///
/// Telegram подписывает данные с помощью HMAC-SHA256.
/// Ключ для HMAC создаётся из bot token: HMAC_SHA256("WebAppData", bot_token)
///
/// # Аргументы
/// * `init_data` - Строка с параметрами от Telegram (query string format)
/// * `bot_token` - Токен бота
///
/// # Возвращает
/// `Ok(user_id)` если валидация успешна, иначе `Err`
pub fn validate_telegram_webapp_data(init_data: &str, bot_token: &str) -> Result<i64> {
    let params = parse_init_data(init_data);

    let received_hash = params.get("hash").ok_or_else(|| anyhow!("Missing hash parameter"))?;

    // data_check_string: все параметры кроме hash, отсортированные по ключу
    let mut check_pairs: Vec<String> = params
        .iter()
        .filter(|(key, _)| key.as_str() != "hash")
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    check_pairs.sort();
    let data_check_string = check_pairs.join("\n");

    // secret key: HMAC_SHA256("WebAppData", bot_token)
    let mut secret_key_mac = HmacSha256::new_from_slice(b"WebAppData").map_err(|e| anyhow!("HMAC init: {}", e))?;
    secret_key_mac.update(bot_token.as_bytes());
    let secret_key = secret_key_mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key).map_err(|e| anyhow!("HMAC init: {}", e))?;
    mac.update(data_check_string.as_bytes());
    let calculated_hash = hex::encode(mac.finalize().into_bytes());

    if calculated_hash != *received_hash {
        return Err(anyhow!("Invalid hash - data may be tampered"));
    }

    // Отклоняем устаревшие init data
    if let Some(auth_date_str) = params.get("auth_date") {
        if let Ok(auth_date) = auth_date_str.parse::<i64>() {
            let now = chrono::Utc::now().timestamp();
            let age_seconds = now - auth_date;
            if age_seconds > MAX_INIT_DATA_AGE_SECS {
                return Err(anyhow!("Init data is too old ({} seconds)", age_seconds));
            }
        }
    }

    user_id_from_params(&params)
}

/// Извлечение user_id из Telegram init data БЕЗ валидации
///
/// Используется когда валидация отключена (для разработки)
pub fn extract_user_id_unsafe(init_data: &str) -> Result<i64> {
    user_id_from_params(&parse_init_data(init_data))
}
