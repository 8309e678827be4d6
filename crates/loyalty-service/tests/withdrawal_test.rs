//! 提现与余额集成测试

mod common;

use std::sync::Arc;

use common::seed_credit;
use loyalty::{
    Balance, BalanceService, LedgerEntry, LedgerRepositoryTrait, LoyaltyError, MemoryStore,
    WithdrawalService,
};

const WITHDRAW_ORDER: &str = "2377225624";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() {
    let store = MemoryStore::new();
    seed_credit(&store, "alice", "79927398713", 1_000).await;

    let service = Arc::new(WithdrawalService::new(Arc::new(store.clone())));
    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.withdraw("alice", WITHDRAW_ORDER, 100).await
        }));
    }

    let mut recorded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => recorded += 1,
            Err(LoyaltyError::InsufficientFunds { requested, .. }) => {
                assert_eq!(requested, 100);
                rejected += 1;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(recorded, 10);
    assert_eq!(rejected, 10);

    let balance = BalanceService::new(Arc::new(store.clone()))
        .balance("alice")
        .await
        .unwrap();
    assert_eq!(balance.current, 0);
    assert_eq!(balance.withdrawn, 1_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uneven_withdrawals_keep_balance_non_negative() {
    let store = MemoryStore::new();
    seed_credit(&store, "alice", "79927398713", 1_000).await;

    let service = Arc::new(WithdrawalService::new(Arc::new(store.clone())));
    let amounts = [300, 450, 250, 700, 120, 90, 600, 10];
    let mut handles = Vec::new();
    for amount in amounts {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.withdraw("alice", WITHDRAW_ORDER, amount).await
        }));
    }

    let mut withdrawn = 0;
    for handle in handles {
        if let Ok(entry) = handle.await.unwrap() {
            withdrawn -= entry.amount;
        }
    }

    let balance = BalanceService::new(Arc::new(store.clone()))
        .balance("alice")
        .await
        .unwrap();
    assert!(balance.current >= 0);
    assert_eq!(balance.withdrawn, withdrawn);
    assert_eq!(balance.current, 1_000 - withdrawn);
}

#[tokio::test]
async fn test_withdrawals_are_per_user() {
    let store = MemoryStore::new();
    seed_credit(&store, "alice", "79927398713", 500).await;
    seed_credit(&store, "bob", "4561261212345467", 50).await;

    let service = WithdrawalService::new(Arc::new(store.clone()));

    let err = service
        .withdraw("bob", WITHDRAW_ORDER, 100)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::InsufficientFunds {
            requested: 100,
            available: 50
        }
    ));

    service.withdraw("alice", WITHDRAW_ORDER, 100).await.unwrap();

    let balances = BalanceService::new(Arc::new(store.clone()));
    assert_eq!(balances.balance("alice").await.unwrap().current, 400);
    assert_eq!(balances.balance("bob").await.unwrap().current, 50);
}

#[tokio::test]
async fn test_withdrawal_cannot_use_another_users_order() {
    let store = MemoryStore::new();
    seed_credit(&store, "bob", "79927398713", 50).await;
    seed_credit(&store, "alice", "4561261212345467", 500).await;
    let service = WithdrawalService::new(Arc::new(store.clone()));

    let err = service
        .withdraw("alice", "79927398713", 100)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LoyaltyError::OrderOwnedByOther { ref number } if number == "79927398713"
    ));

    // 该订单下的流水只属于订单所有者
    let entries = store.entries_for_order("79927398713");
    assert_eq!(entries.len(), 1);
    assert!(entries.iter().all(|e| e.owner == "bob"));

    let balances = BalanceService::new(Arc::new(store.clone()));
    assert_eq!(balances.balance("alice").await.unwrap().current, 500);
    assert_eq!(balances.balance("bob").await.unwrap().current, 50);
}

#[tokio::test]
async fn test_rejected_withdrawal_writes_nothing() {
    let store = MemoryStore::new();
    seed_credit(&store, "alice", "79927398713", 100).await;
    let service = WithdrawalService::new(Arc::new(store.clone()));

    assert!(service.withdraw("alice", "2377225625", 10).await.is_err());
    assert!(service.withdraw("alice", WITHDRAW_ORDER, 0).await.is_err());
    assert!(service.withdraw("alice", WITHDRAW_ORDER, 101).await.is_err());

    assert_eq!(store.ledger().len(), 1);
}

#[tokio::test]
async fn test_withdrawal_history_in_order() {
    let store = MemoryStore::new();
    seed_credit(&store, "alice", "79927398713", 1_000).await;
    let service = WithdrawalService::new(Arc::new(store.clone()));

    service.withdraw("alice", "2377225624", 100).await.unwrap();
    service.withdraw("alice", "79927398713", 200).await.unwrap();

    let history = BalanceService::new(Arc::new(store.clone()))
        .withdrawals("alice")
        .await
        .unwrap();
    let summary: Vec<(&str, i64)> = history
        .iter()
        .map(|e| (e.order_number.as_str(), e.amount))
        .collect();
    assert_eq!(summary, vec![("2377225624", -100), ("79927398713", -200)]);
}

#[tokio::test]
async fn test_balance_equals_ledger_sum_in_any_order() {
    let store = MemoryStore::new();
    seed_credit(&store, "alice", "79927398713", 1_200).await;
    store.append("79927398713", 300).await.unwrap();
    let service = WithdrawalService::new(Arc::new(store.clone()));
    service.withdraw("alice", WITHDRAW_ORDER, 450).await.unwrap();
    service.withdraw("alice", WITHDRAW_ORDER, 50).await.unwrap();

    let mut entries: Vec<LedgerEntry> = store.entries_for_user("alice").await.unwrap();
    let expected = Balance::from_entries(&entries);
    assert_eq!(expected.current, entries.iter().map(|e| e.amount).sum::<i64>());
    assert_eq!(expected.current, 1_000);
    assert_eq!(expected.withdrawn, 500);

    entries.reverse();
    assert_eq!(Balance::from_entries(&entries), expected);
    entries.rotate_left(1);
    assert_eq!(Balance::from_entries(&entries), expected);
}
