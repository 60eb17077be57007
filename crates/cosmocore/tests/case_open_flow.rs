//! End-to-end settlement flow over the public API: topup, case opens,
//! inventory, duplicate payment replay.

use std::sync::Arc;

use async_trait::async_trait;
use cosmocore::error::AppResult;
use cosmocore::gifts::{GiftPool, GiftSender};
use cosmocore::ledger::{CreditOutcome, Ledger};
use cosmocore::{create_pool, AppError};
use tempfile::TempDir;

struct RecordingSender {
    delivered: std::sync::Mutex<Vec<(String, i64)>>,
}

#[async_trait]
impl GiftSender for RecordingSender {
    async fn list_available(&self) -> AppResult<Vec<String>> {
        Ok(vec!["gift-a".to_string(), "gift-b".to_string()])
    }

    async fn deliver(&self, gift_id: &str, telegram_id: i64) -> AppResult<()> {
        self.delivered.lock().unwrap().push((gift_id.to_string(), telegram_id));
        Ok(())
    }
}

fn build_ledger() -> (Ledger, Arc<RecordingSender>, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flow.sqlite");
    let pool = Arc::new(create_pool(path.to_str().unwrap()).unwrap());
    let sender = Arc::new(RecordingSender {
        delivered: std::sync::Mutex::new(Vec::new()),
    });
    let gift_pool = Arc::new(GiftPool::new());
    let ledger = Ledger::new(pool, Arc::clone(&gift_pool), Arc::clone(&sender) as Arc<dyn GiftSender>);
    (ledger, sender, dir)
}

#[tokio::test]
async fn full_topup_and_open_flow() {
    let (ledger, _sender, _dir) = build_ledger();
    let user = 1001;

    // A fresh account cannot afford a case.
    let err = ledger.settle_case_open(user, 100).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { balance: 0, required: 100 }));

    // Topup settles once per charge id.
    let credited = ledger.credit_purchase(user, 300, "flow-charge-1").await.unwrap();
    assert_eq!(credited, CreditOutcome::Credited { balance_after: 300 });
    assert_eq!(
        ledger.credit_purchase(user, 300, "flow-charge-1").await.unwrap(),
        CreditOutcome::AlreadyApplied
    );

    // Three opens drain the balance; every open appends an inventory row.
    for expected_balance in [200, 100, 0] {
        let outcome = ledger.settle_case_open(user, 100).await.unwrap();
        assert_eq!(outcome.balance_after, expected_balance);
        assert!(outcome.prize.value >= 0);
    }

    let entries = ledger.inventory(user, 10).await.unwrap();
    assert_eq!(entries.len(), 3);

    // A fourth open is rejected and leaves state untouched.
    let err = ledger.settle_case_open(user, 100).await.unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { balance: 0, required: 100 }));
    assert_eq!(ledger.inventory(user, 10).await.unwrap().len(), 3);
    assert_eq!(ledger.account(user, None).await.unwrap().crystals, 0);
}

#[tokio::test]
async fn gift_pool_refresh_and_scarcity() {
    let (ledger, sender, _dir) = build_ledger();

    // Refresh pulls the two available ids from the collaborator.
    let pool = GiftPool::new();
    pool.refresh(sender.as_ref()).await;
    assert_eq!(pool.len().await, 2);

    // The ledger built with an empty pool still settles, without gifts.
    let user = 2002;
    ledger.credit_purchase(user, 100, "flow-charge-2").await.unwrap();
    let outcome = ledger.settle_case_open(user, 100).await.unwrap();
    assert!(!outcome.gift_delivered);
    assert_eq!(outcome.gift_id, None);
}
