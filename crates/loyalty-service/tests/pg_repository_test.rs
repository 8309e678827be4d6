//! PostgreSQL 仓储集成测试
//!
//! 验证唯一约束判重、判定原子落库和 advisory lock 串行化提现。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... \
//!   cargo test --test pg_repository_test -- --ignored
//! ```

use std::sync::Arc;

use chrono::Utc;
use loyalty::repository::MIGRATOR;
use loyalty::{
    AccrualVerdict, Balance, LedgerRepository, LoyaltyError, OrderRepository, OrderStatus,
    SubmitOutcome, WithdrawalOutcome, WithdrawalService,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

// ==================== 辅助函数 ====================

fn database_url() -> String {
    std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests")
}

async fn setup_pool() -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url())
        .await
        .expect("数据库连接失败");
    MIGRATOR.run(&pool).await.expect("迁移失败");
    pool
}

/// 行锁等待超过 200ms 即报错的连接池，用于让批次中途失败
async fn setup_impatient_pool() -> PgPool {
    PgPoolOptions::new()
        .max_connections(2)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET lock_timeout = '200ms'").await?;
                Ok(())
            })
        })
        .connect(&database_url())
        .await
        .expect("数据库连接失败")
}

/// 每个测试使用独立的订单号和用户，避免与其他测试或历史数据冲突
fn unique(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    )
}

// ==================== 测试 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL（设置 DATABASE_URL）"]
async fn test_submit_uses_unique_constraint() {
    let pool = setup_pool().await;
    let repo = OrderRepository::new(pool.clone());
    let number = unique("order");
    let alice = unique("alice");
    let bob = unique("bob");

    assert_eq!(repo.submit(&number, &alice).await.unwrap(), SubmitOutcome::Created);
    assert_eq!(
        repo.submit(&number, &alice).await.unwrap(),
        SubmitOutcome::AlreadyOwnedBySelf
    );
    assert_eq!(
        repo.submit(&number, &bob).await.unwrap(),
        SubmitOutcome::AlreadyOwnedByOther
    );

    let orders = repo.list_for_user(&alice).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::New);
    assert!(repo.list_pending().await.unwrap().contains(&number));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL（设置 DATABASE_URL）"]
async fn test_apply_verdicts_credits_once() {
    let pool = setup_pool().await;
    let orders = OrderRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());
    let owner = unique("owner");
    let processed = unique("processed");
    let invalid = unique("invalid");

    orders.submit(&processed, &owner).await.unwrap();
    orders.submit(&invalid, &owner).await.unwrap();

    let batch = vec![
        AccrualVerdict::processing(processed.clone()),
        AccrualVerdict::processed(processed.clone(), 72_998),
        AccrualVerdict::invalid(invalid.clone()),
    ];
    assert_eq!(orders.apply_verdicts(&batch).await.unwrap(), 3);

    // 重放同一批判定不产生任何变化
    assert_eq!(orders.apply_verdicts(&batch).await.unwrap(), 0);

    let entries = ledger.entries_for_user(&owner).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].order_number, processed);
    assert_eq!(entries[0].amount, 72_998);

    let pending = orders.list_pending().await.unwrap();
    assert!(!pending.contains(&processed));
    assert!(!pending.contains(&invalid));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL（设置 DATABASE_URL）"]
async fn test_apply_verdicts_rolls_back_whole_batch() {
    let pool = setup_pool().await;
    let owner = unique("owner");
    let first = unique("first");
    let locked = unique("locked");

    let orders = OrderRepository::new(pool.clone());
    orders.submit(&first, &owner).await.unwrap();
    orders.submit(&locked, &owner).await.unwrap();

    // 另一个事务持有第二个订单的行锁，批次写到它时超时失败
    let mut holder = pool.begin().await.unwrap();
    sqlx::query("SELECT number FROM orders WHERE number = $1 FOR UPDATE")
        .bind(&locked)
        .execute(&mut *holder)
        .await
        .unwrap();

    let impatient = OrderRepository::new(setup_impatient_pool().await);
    let batch = vec![
        AccrualVerdict::processed(first.clone(), 500),
        AccrualVerdict::processed(locked.clone(), 700),
    ];
    let err = impatient.apply_verdicts(&batch).await.unwrap_err();
    assert!(matches!(err, LoyaltyError::Database(_)));

    holder.rollback().await.unwrap();

    // 第一条判定随整批回滚，没有状态变化也没有流水
    let rows = orders.list_for_user(&owner).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|o| o.status == OrderStatus::New && o.accrual == 0));
    let ledger = LedgerRepository::new(pool.clone());
    assert!(ledger.entries_for_user(&owner).await.unwrap().is_empty());

    // 锁释放后同一批可以完整应用
    assert_eq!(orders.apply_verdicts(&batch).await.unwrap(), 2);
    let balance = Balance::from_entries(&ledger.entries_for_user(&owner).await.unwrap());
    assert_eq!(balance.current, 1_200);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL（设置 DATABASE_URL）"]
async fn test_append_withdrawal_rejects_other_users_order() {
    let pool = setup_pool().await;
    let orders = OrderRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());
    let alice = unique("alice");
    let bob = unique("bob");
    let bobs_order = unique("bob-order");
    let alices_order = unique("alice-order");

    orders.submit(&bobs_order, &bob).await.unwrap();
    ledger.append(&bobs_order, 50).await.unwrap();
    orders.submit(&alices_order, &alice).await.unwrap();
    ledger.append(&alices_order, 500).await.unwrap();

    let err = ledger
        .append_withdrawal(&alice, &bobs_order, 100)
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::OrderOwnedByOther { .. }));
    assert!(ledger.withdrawal_entries_for_user(&alice).await.unwrap().is_empty());

    let outcome = ledger
        .append_withdrawal(&alice, &alices_order, 100)
        .await
        .unwrap();
    assert!(matches!(outcome, WithdrawalOutcome::Recorded(ref e) if e.owner == alice));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL（设置 DATABASE_URL）"]
async fn test_append_unknown_order_fails() {
    let pool = setup_pool().await;
    let ledger = LedgerRepository::new(pool);

    let err = ledger.append(&unique("missing"), 100).await.unwrap_err();
    assert!(matches!(err, LoyaltyError::OrderNotFound(_)));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL（设置 DATABASE_URL）"]
async fn test_append_withdrawal_checks_balance() {
    let pool = setup_pool().await;
    let orders = OrderRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());
    let owner = unique("owner");
    let number = unique("credit");

    orders.submit(&number, &owner).await.unwrap();
    ledger.append(&number, 1_000).await.unwrap();

    let outcome = ledger
        .append_withdrawal(&owner, "2377225624", 1_001)
        .await
        .unwrap();
    assert_eq!(outcome, WithdrawalOutcome::InsufficientFunds { available: 1_000 });

    let outcome = ledger
        .append_withdrawal(&owner, "2377225624", 400)
        .await
        .unwrap();
    assert!(matches!(outcome, WithdrawalOutcome::Recorded(ref e) if e.amount == -400));

    let history = ledger.withdrawal_entries_for_user(&owner).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "需要 PostgreSQL（设置 DATABASE_URL）"]
async fn test_concurrent_withdrawals_never_overdraw() {
    let pool = setup_pool().await;
    let orders = OrderRepository::new(pool.clone());
    let ledger = Arc::new(LedgerRepository::new(pool.clone()));
    let owner = unique("owner");
    let number = unique("credit");

    orders.submit(&number, &owner).await.unwrap();
    ledger.append(&number, 1_000).await.unwrap();

    let service = Arc::new(WithdrawalService::new(Arc::clone(&ledger)));
    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = Arc::clone(&service);
        let owner = owner.clone();
        handles.push(tokio::spawn(async move {
            service.withdraw(&owner, "2377225624", 100).await
        }));
    }

    let mut recorded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 10);

    let balance = Balance::from_entries(&ledger.entries_for_user(&owner).await.unwrap());
    assert_eq!(balance.current, 0);
    assert_eq!(balance.withdrawn, 1_000);
}
