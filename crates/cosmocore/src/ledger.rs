//! Balance & inventory ledger
//!
//! Owns every mutation of an account's crystal balance and inventory. A case
//! open debits the cost, draws a prize, and appends the inventory entry in a
//! single SQLite transaction; a Stars purchase credits the balance at most
//! once per Telegram charge id.
//!
//! Balance mutations for the same account are serialized through a
//! per-account async mutex, so concurrent case opens cannot race the
//! read-then-write on the balance. The SQL debit additionally carries a
//! `crystals >= cost` guard, so the non-negative invariant holds even if a
//! second process shares the database file.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::{self, DbPool, InventoryEntry};
use crate::error::{AppError, AppResult};
use crate::gifts::{GiftPool, GiftSender};
use crate::metrics;
use crate::prizes::{self, PrizeDef, Rarity};

/// Результат открытия кейса.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    /// Выпавший приз
    pub prize: PrizeDef,
    /// Идентификатор доставленного подарка, если был
    pub gift_id: Option<String>,
    /// Был ли реально доставлен внешний подарок
    pub gift_delivered: bool,
    /// Баланс кристаллов после списания
    pub balance_after: i64,
}

/// Результат начисления платежа.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Платёж новый, баланс увеличен
    Credited { balance_after: i64 },
    /// Повторное подтверждение уже учтённого charge_id; ничего не изменено
    AlreadyApplied,
}

/// Service object holding the ledger's dependencies. Constructed once at
/// startup and shared by reference with every request handler.
pub struct Ledger {
    pool: Arc<DbPool>,
    gift_pool: Arc<GiftPool>,
    gift_sender: Arc<dyn GiftSender>,
    /// Per-account settlement locks, created lazily and never evicted. One
    /// `Arc<Mutex<()>>` per user who ever touched their balance is cheap.
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Ledger {
    pub fn new(pool: Arc<DbPool>, gift_pool: Arc<GiftPool>, gift_sender: Arc<dyn GiftSender>) -> Self {
        Self {
            pool,
            gift_pool,
            gift_sender,
            locks: DashMap::new(),
        }
    }

    fn account_lock(&self, telegram_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(telegram_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Открывает один кейс: проверка баланса, списание, розыгрыш приза,
    /// запись в инвентарь. Списание и запись коммитятся одной транзакцией.
    ///
    /// # Errors
    ///
    /// `AppError::InsufficientFunds` если `cost > 0` и баланса не хватает;
    /// в этом случае состояние не меняется. Ошибки БД фатальны для запроса
    /// и откатывают транзакцию целиком.
    pub async fn settle_case_open(&self, telegram_id: i64, cost: i64) -> AppResult<CaseOutcome> {
        if cost < 0 {
            return Err(AppError::Validation(format!("negative case cost: {}", cost)));
        }

        // thread_rng is !Send; keep it out of the async part
        let prize = {
            let mut rng = rand::thread_rng();
            prizes::draw(&mut rng)
        };
        self.settle(telegram_id, cost, prize).await
    }

    /// Settlement with a pre-drawn prize. Split out so tests can force a
    /// specific draw outcome.
    async fn settle(&self, telegram_id: i64, cost: i64, prize: PrizeDef) -> AppResult<CaseOutcome> {
        let lock = self.account_lock(telegram_id);
        let _guard = lock.lock().await;

        let mut conn = db::get_connection(&self.pool)?;
        let account = db::ensure_account(&conn, telegram_id, None)?;

        if cost > 0 && account.crystals < cost {
            return Err(AppError::InsufficientFunds {
                balance: account.crystals,
                required: cost,
            });
        }

        // Gift attach happens before the transaction opens: delivery is an
        // external await and a rusqlite transaction must not be held across
        // it. The pool pop is atomic; a failed delivery puts the id back so
        // the scarce inventory is not burned.
        let mut gift_id: Option<String> = None;
        let mut gift_delivered = false;
        if prize.rarity != Rarity::Common {
            match self.gift_pool.take().await {
                Some(id) => match self.gift_sender.deliver(&id, telegram_id).await {
                    Ok(()) => {
                        log::info!("Delivered gift {} to user {}", id, telegram_id);
                        metrics::GIFT_DELIVERIES_TOTAL.with_label_values(&["delivered"]).inc();
                        gift_delivered = true;
                        gift_id = Some(id);
                    }
                    Err(e) => {
                        // Best-effort by contract: the user still gets the
                        // prize record, just without the physical gift.
                        log::warn!("Gift delivery to user {} failed, returning {} to pool: {}", telegram_id, id, e);
                        metrics::GIFT_DELIVERIES_TOTAL.with_label_values(&["failed"]).inc();
                        self.gift_pool.put_back(id).await;
                    }
                },
                None => {
                    metrics::GIFT_DELIVERIES_TOTAL.with_label_values(&["pool_empty"]).inc();
                }
            }
        }

        let tx = conn.transaction()?;
        if cost > 0 {
            // Second guard at the SQL level; with the per-account lock held
            // this only fires if an external writer drained the balance.
            if !db::debit_crystals(&tx, telegram_id, cost)? {
                return Err(AppError::InsufficientFunds {
                    balance: account.crystals,
                    required: cost,
                });
            }
        }
        db::insert_inventory_entry(&tx, telegram_id, &prize, gift_id.as_deref())?;
        tx.commit()?;

        metrics::CASES_OPENED_TOTAL
            .with_label_values(&[prize.rarity.as_str()])
            .inc();

        let balance_after = account.crystals - if cost > 0 { cost } else { 0 };
        log::info!(
            "Case opened by user {}: {} {} ({}), cost {}, balance {}",
            telegram_id,
            prize.emoji,
            prize.name,
            prize.rarity,
            cost,
            balance_after
        );

        Ok(CaseOutcome {
            prize,
            gift_id,
            gift_delivered,
            balance_after,
        })
    }

    /// Начисляет кристаллы за оплаченный Stars-платёж.
    ///
    /// Идемпотентно по `charge_id`: повторное подтверждение того же платежа
    /// возвращает `CreditOutcome::AlreadyApplied` и ничего не меняет.
    pub async fn credit_purchase(&self, telegram_id: i64, amount: i64, charge_id: &str) -> AppResult<CreditOutcome> {
        if amount <= 0 {
            return Err(AppError::Validation(format!("non-positive credit amount: {}", amount)));
        }
        if charge_id.is_empty() {
            return Err(AppError::Validation("empty charge_id".to_string()));
        }

        let lock = self.account_lock(telegram_id);
        let _guard = lock.lock().await;

        let mut conn = db::get_connection(&self.pool)?;
        db::ensure_account(&conn, telegram_id, None)?;

        let tx = conn.transaction()?;
        if !db::insert_payment_credit(&tx, charge_id, telegram_id, amount)? {
            log::warn!(
                "Duplicate payment confirmation for charge {} (user {}), skipping credit",
                charge_id,
                telegram_id
            );
            metrics::PAYMENTS_TOTAL.with_label_values(&["duplicate"]).inc();
            return Ok(CreditOutcome::AlreadyApplied);
        }
        db::credit_crystals(&tx, telegram_id, amount)?;
        tx.commit()?;

        metrics::PAYMENTS_TOTAL.with_label_values(&["credited"]).inc();

        let balance_after = db::get_account(&conn, telegram_id)?
            .map(|a| a.crystals)
            .unwrap_or(amount);
        log::info!(
            "Credited {} crystals to user {} (charge {}), balance {}",
            amount,
            telegram_id,
            charge_id,
            balance_after
        );
        Ok(CreditOutcome::Credited { balance_after })
    }

    /// Текущий аккаунт пользователя (создаётся при первом обращении).
    pub async fn account(&self, telegram_id: i64, username: Option<&str>) -> AppResult<db::Account> {
        let conn = db::get_connection(&self.pool)?;
        Ok(db::ensure_account(&conn, telegram_id, username)?)
    }

    /// Последние записи инвентаря пользователя.
    pub async fn inventory(&self, telegram_id: i64, limit: i64) -> AppResult<Vec<InventoryEntry>> {
        let conn = db::get_connection(&self.pool)?;
        Ok(db::get_inventory(&conn, telegram_id, limit)?)
    }

    /// Сколько подарков осталось в пуле.
    pub async fn gifts_available(&self) -> usize {
        self.gift_pool.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::prizes::CATALOG;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct StubSender {
        fail: bool,
        delivered: std::sync::Mutex<Vec<String>>,
    }

    impl StubSender {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                delivered: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GiftSender for StubSender {
        async fn list_available(&self) -> AppResult<Vec<String>> {
            Ok(vec![])
        }

        async fn deliver(&self, gift_id: &str, _telegram_id: i64) -> AppResult<()> {
            if self.fail {
                return Err(AppError::GiftDelivery("stub failure".to_string()));
            }
            self.delivered.lock().unwrap().push(gift_id.to_string());
            Ok(())
        }
    }

    fn epic_prize() -> PrizeDef {
        CATALOG
            .iter()
            .find(|p| p.rarity == Rarity::Epic && p.value == 250)
            .cloned()
            .unwrap()
    }

    fn common_prize() -> PrizeDef {
        CATALOG.iter().find(|p| p.rarity == Rarity::Common).cloned().unwrap()
    }

    fn test_ledger(gift_ids: Vec<&str>, sender: Arc<StubSender>) -> (Ledger, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite");
        let pool = Arc::new(db::create_pool(path.to_str().unwrap()).unwrap());
        let gift_pool = Arc::new(GiftPool::with_ids(gift_ids.into_iter().map(String::from).collect()));
        (Ledger::new(pool, gift_pool, sender), dir)
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_state_unchanged() {
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec![], sender);

        let err = ledger.settle_case_open(1, 100).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientFunds { balance: 0, required: 100 }));

        let account = ledger.account(1, None).await.unwrap();
        assert_eq!(account.crystals, 0);
        assert!(ledger.inventory(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_free_draw_never_touches_balance() {
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec![], sender);
        ledger.credit_purchase(2, 500, "c-free").await.unwrap();

        let outcome = ledger.settle_case_open(2, 0).await.unwrap();
        assert_eq!(outcome.balance_after, 500);
        assert_eq!(ledger.account(2, None).await.unwrap().crystals, 500);
        assert_eq!(ledger.inventory(2, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_epic_draw_scenario() {
        // Balance 500, cost 100, forced Epic/250 draw: balance 400 plus one
        // Epic inventory row.
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec![], sender);
        ledger.credit_purchase(3, 500, "c-epic").await.unwrap();

        let outcome = ledger.settle(3, 100, epic_prize()).await.unwrap();
        assert_eq!(outcome.balance_after, 400);
        assert_eq!(outcome.prize.rarity, Rarity::Epic);
        assert_eq!(outcome.prize.value, 250);

        let entries = ledger.inventory(3, 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rarity, Rarity::Epic);
        assert_eq!(entries[0].value, 250);
        assert_eq!(ledger.account(3, None).await.unwrap().crystals, 400);
    }

    #[tokio::test]
    async fn test_credit_is_idempotent_per_charge() {
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec![], sender);

        let first = ledger.credit_purchase(4, 100, "charge-1").await.unwrap();
        assert_eq!(first, CreditOutcome::Credited { balance_after: 100 });

        let replay = ledger.credit_purchase(4, 100, "charge-1").await.unwrap();
        assert_eq!(replay, CreditOutcome::AlreadyApplied);
        assert_eq!(ledger.account(4, None).await.unwrap().crystals, 100);

        // A different charge credits normally and the new balance is visible
        // to the affordability check.
        ledger.credit_purchase(4, 100, "charge-2").await.unwrap();
        assert!(ledger.settle(4, 200, common_prize()).await.is_ok());
        assert_eq!(ledger.account(4, None).await.unwrap().crystals, 0);
    }

    #[tokio::test]
    async fn test_non_common_draw_with_empty_pool() {
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec![], Arc::clone(&sender));
        ledger.credit_purchase(5, 100, "c-pool").await.unwrap();

        let outcome = ledger.settle(5, 100, epic_prize()).await.unwrap();
        assert!(!outcome.gift_delivered);
        assert_eq!(outcome.gift_id, None);

        let entries = ledger.inventory(5, 10).await.unwrap();
        assert_eq!(entries[0].gift_id, None);
        assert!(sender.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_common_draw_attaches_gift() {
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec!["gift-77"], Arc::clone(&sender));
        ledger.credit_purchase(6, 100, "c-gift").await.unwrap();

        let outcome = ledger.settle(6, 100, epic_prize()).await.unwrap();
        assert!(outcome.gift_delivered);
        assert_eq!(outcome.gift_id.as_deref(), Some("gift-77"));
        assert_eq!(ledger.gifts_available().await, 0);

        let entries = ledger.inventory(6, 10).await.unwrap();
        assert_eq!(entries[0].gift_id.as_deref(), Some("gift-77"));
        assert_eq!(sender.delivered.lock().unwrap().as_slice(), ["gift-77"]);
    }

    #[tokio::test]
    async fn test_common_draw_never_consumes_gift() {
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec!["gift-1"], sender);
        ledger.credit_purchase(7, 100, "c-common").await.unwrap();

        let outcome = ledger.settle(7, 100, common_prize()).await.unwrap();
        assert!(!outcome.gift_delivered);
        assert_eq!(ledger.gifts_available().await, 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_returns_gift_to_pool() {
        let sender = Arc::new(StubSender::new(true));
        let (ledger, _dir) = test_ledger(vec!["gift-9"], sender);
        ledger.credit_purchase(8, 100, "c-fail").await.unwrap();

        // Delivery failure is swallowed: the draw still succeeds, the prize
        // is recorded without a gift reference, the id goes back to the pool.
        let outcome = ledger.settle(8, 100, epic_prize()).await.unwrap();
        assert!(!outcome.gift_delivered);
        assert_eq!(outcome.gift_id, None);
        assert_eq!(outcome.balance_after, 0);
        assert_eq!(ledger.gifts_available().await, 1);
        assert_eq!(ledger.inventory(8, 10).await.unwrap()[0].gift_id, None);
    }

    #[tokio::test]
    async fn test_concurrent_opens_never_overdraw() {
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec![], sender);
        let ledger = Arc::new(ledger);
        ledger.credit_purchase(9, 500, "c-conc").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.settle(9, 100, common_prize()).await
            }));
        }

        let mut ok = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::InsufficientFunds { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        assert_eq!(ok, 5);
        assert_eq!(rejected, 5);
        let account = ledger.account(9, None).await.unwrap();
        assert_eq!(account.crystals, 0);
        assert_eq!(ledger.inventory(9, 20).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_negative_cost_is_rejected() {
        let sender = Arc::new(StubSender::new(false));
        let (ledger, _dir) = test_ledger(vec![], sender);
        assert!(matches!(
            ledger.settle_case_open(10, -1).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }
}
