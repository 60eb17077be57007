//! HTTP-сервер мини-приложения Cosmic Treasure Hunt
//!
//! Мини-приложение ходит сюда за балансом и инвентарём и отправляет действия
//! (покупка кристаллов, открытие кейса). Каждый запрос авторизуется через
//! заголовок `X-Telegram-Init-Data`, подписанный Telegram.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::LabeledPrice;
use tower_http::cors::{Any, CorsLayer};

use cosmocore::config;
use cosmocore::error::AppError;
use cosmocore::ledger::Ledger;
use cosmocore::metrics;

use crate::telegram::webapp_auth;
use crate::telegram::Bot;

// ============================================================================
// СТРУКТУРЫ ДАННЫХ ДЛЯ API
// ============================================================================

/// Действие, отправляемое из Mini App
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebAppAction {
    /// "buy_currency" или "open_case"
    pub action: String,
    /// Для buy_currency: размер пакета в Stars
    pub amount: Option<u32>,
    /// Для open_case: переопределение стоимости (промо-кейсы); по умолчанию
    /// берётся стоимость из конфигурации
    pub cost: Option<i64>,
}

/// Приз в ответе API
#[derive(Debug, Serialize)]
pub struct PrizeView {
    pub name: String,
    pub rarity: String,
    pub emoji: String,
    pub value: i64,
}

/// Элемент инвентаря в ответе API
#[derive(Debug, Serialize)]
pub struct InventoryItemView {
    pub id: i64,
    pub name: String,
    pub rarity: String,
    pub emoji: String,
    pub value: i64,
    pub gift_attached: bool,
    pub won_at: String,
}

// ============================================================================
// СОСТОЯНИЕ ПРИЛОЖЕНИЯ
// ============================================================================

/// Shared state для всех endpoints
#[derive(Clone)]
pub struct WebAppState {
    pub ledger: Arc<Ledger>,
    pub bot: Bot,
    pub bot_token: String,
}

// ============================================================================
// ВСПОМОГАТЕЛЬНЫЕ ФУНКЦИИ
// ============================================================================

/// Извлечение user_id из headers (Telegram init data)
fn extract_user_id(headers: &HeaderMap, bot_token: &str) -> Result<i64, ApiError> {
    let init_data = headers
        .get("X-Telegram-Init-Data")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Telegram init data".to_string()))?;

    webapp_auth::validate_telegram_webapp_data(init_data, bot_token)
        .map_err(|e| ApiError::Unauthorized(format!("Invalid init data: {}", e)))
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Validation(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

// ============================================================================
// РОУТЕР
// ============================================================================

/// Создает роутер для Mini App
pub fn create_webapp_router(ledger: Arc<Ledger>, bot: Bot, bot_token: String) -> Router {
    let state = WebAppState { ledger, bot, bot_token };

    // CORS для Mini App
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/action", post(handle_action))
        .route("/api/user/{id}/balance", get(handle_get_balance))
        .route("/api/user/{id}/inventory", get(handle_get_inventory))
        .route("/metrics", get(handle_metrics))
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Запускает веб-сервер для Mini App
pub async fn run_webapp_server(port: u16, ledger: Arc<Ledger>, bot: Bot, bot_token: String) -> anyhow::Result<()> {
    let app = create_webapp_router(ledger, bot, bot_token);

    let addr = format!("0.0.0.0:{}", port);
    log::info!("🌐 Starting Mini App web server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// API HANDLERS
// ============================================================================

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cosmobot-webapp"
    }))
}

/// GET /metrics — Prometheus text exposition
async fn handle_metrics() -> impl IntoResponse {
    metrics::gather()
}

/// POST /api/action — покупка кристаллов или открытие кейса
async fn handle_action(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
    Json(req): Json<WebAppAction>,
) -> Result<Response, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token)?;

    log::info!("Mini App action from user {}: {}", user_id, req.action);

    match req.action.as_str() {
        "buy_currency" => {
            let stars = req
                .amount
                .ok_or_else(|| ApiError::BadRequest("Missing amount for buy_currency".to_string()))?;
            let crystals = config::prices::pack_crystals(stars)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown topup pack: {} Stars", stars)))?;

            let payload = format!("topup:{}:{}", stars, user_id);
            let invoice_url = state
                .bot
                .create_invoice_link(
                    format!("💎 {} кристаллов", crystals),
                    format!("Пакет из {} кристаллов. Одноразовый платёж {} Stars.", crystals, stars),
                    payload,
                    "XTR".to_string(),
                    vec![LabeledPrice::new(format!("{} кристаллов", crystals), stars)],
                )
                .await
                .map_err(|e| ApiError::Internal(format!("Failed to create invoice: {}", e)))?;

            Ok(Json(serde_json::json!({
                "success": true,
                "invoice_link": invoice_url,
            }))
            .into_response())
        }
        "open_case" => {
            let cost = req.cost.unwrap_or(*config::cases::COST_CRYSTALS);

            match state.ledger.settle_case_open(user_id, cost).await {
                Ok(outcome) => Ok(Json(serde_json::json!({
                    "success": true,
                    "prize": PrizeView {
                        name: outcome.prize.name.clone(),
                        rarity: outcome.prize.rarity.to_string(),
                        emoji: outcome.prize.emoji.clone(),
                        value: outcome.prize.value,
                    },
                    "gift_delivered": outcome.gift_delivered,
                    "balance": outcome.balance_after,
                }))
                .into_response()),
                Err(AppError::InsufficientFunds { balance, required }) => Ok((
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "success": false,
                        "error": "insufficient_funds",
                        "balance": balance,
                        "required": required,
                    })),
                )
                    .into_response()),
                Err(e) => Err(e.into()),
            }
        }
        other => Err(ApiError::BadRequest(format!("Unknown action: {}", other))),
    }
}

/// GET /api/user/{id}/balance
async fn handle_get_balance(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token)?;
    if user_id != id {
        return Err(ApiError::Unauthorized("Init data does not match requested user".to_string()));
    }

    let account = state.ledger.account(user_id, None).await?;
    Ok(Json(serde_json::json!({
        "user_id": account.telegram_id,
        "crystals": account.crystals,
    })))
}

/// GET /api/user/{id}/inventory
async fn handle_get_inventory(
    State(state): State<Arc<WebAppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = extract_user_id(&headers, &state.bot_token)?;
    if user_id != id {
        return Err(ApiError::Unauthorized("Init data does not match requested user".to_string()));
    }

    let entries = state.ledger.inventory(user_id, config::cases::INVENTORY_PAGE_SIZE).await?;
    let items: Vec<InventoryItemView> = entries
        .into_iter()
        .map(|e| InventoryItemView {
            id: e.id,
            name: e.name,
            rarity: e.rarity.to_string(),
            emoji: e.emoji,
            value: e.value,
            gift_attached: e.gift_id.is_some(),
            won_at: e.won_at,
        })
        .collect();

    Ok(Json(serde_json::json!({ "items": items })))
}
