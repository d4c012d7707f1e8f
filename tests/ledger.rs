use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use mileage_server::mileage::{MemoryMileageStore, MileageLedger, MileageService};
use mileage_server::MileageError;

fn service() -> (Arc<MemoryMileageStore>, MileageService) {
    let store = Arc::new(MemoryMileageStore::new());
    let service = MileageService::new(store.clone(), store.clone());
    (store, service)
}

fn seed(store: &MemoryMileageStore, user_id: i64, annual: i64, personal: i64) {
    store.put_ledger(MileageLedger {
        user_id,
        annual_mileage: annual,
        personal_charged_mileage: personal,
        join_date: NaiveDate::from_ymd_opt(2021, 5, 10).unwrap(),
        updated_at: Utc::now(),
    });
}

// key: ledger-tests -> create,get,delete round trip
#[tokio::test]
async fn create_get_delete_round_trip() {
    let (_store, service) = service();

    let created = service.create_ledger(1).await.unwrap();
    assert_eq!(created.annual_mileage, 0);
    assert_eq!(created.personal_charged_mileage, 0);

    let fetched = service.get_ledger(1).await.unwrap();
    assert_eq!(fetched.user_id, 1);
    assert_eq!(fetched.annual_mileage, 0);
    assert_eq!(fetched.personal_charged_mileage, 0);
    assert_eq!(fetched.join_date, Utc::now().date_naive());

    service.delete_ledger(1).await.unwrap();
    assert!(matches!(
        service.get_ledger(1).await,
        Err(MileageError::LedgerNotFound(1))
    ));
}

#[tokio::test]
async fn create_twice_fails_already_exists() {
    let (_store, service) = service();
    service.create_ledger(9).await.unwrap();
    assert!(matches!(
        service.create_ledger(9).await,
        Err(MileageError::LedgerAlreadyExists(9))
    ));
}

#[tokio::test]
async fn delete_missing_ledger_fails_not_found() {
    let (_store, service) = service();
    assert!(matches!(
        service.delete_ledger(404).await,
        Err(MileageError::LedgerNotFound(404))
    ));
}

#[tokio::test]
async fn consume_spills_into_personal_bucket() {
    let (store, service) = service();
    seed(&store, 1, 1000, 500);
    seed(&store, 2, 1000, 500);

    let spilled = service.consume(1, 1200, Some("order 77")).await.unwrap();
    assert_eq!(spilled.annual_mileage, 0);
    assert_eq!(spilled.personal_charged_mileage, 300);

    let within = service.consume(2, 800, None).await.unwrap();
    assert_eq!(within.annual_mileage, 200);
    assert_eq!(within.personal_charged_mileage, 500);
}

#[tokio::test]
async fn insufficient_balance_leaves_ledger_unchanged() {
    let (store, service) = service();
    seed(&store, 1, 1000, 500);

    let err = service.consume(1, 2000, None).await.unwrap_err();
    assert!(matches!(
        err,
        MileageError::InsufficientBalance {
            user_id: 1,
            requested: 2000,
            available: 1500
        }
    ));

    let ledger = service.get_ledger(1).await.unwrap();
    assert_eq!(ledger.annual_mileage, 1000);
    assert_eq!(ledger.personal_charged_mileage, 500);
}

#[tokio::test]
async fn refund_credits_annual_bucket() {
    let (store, service) = service();
    seed(&store, 1, 1000, 500);

    service.consume(1, 1200, None).await.unwrap();
    let refunded = service.refund(1, 1200).await.unwrap();
    assert_eq!(refunded.annual_mileage, 1200);
    assert_eq!(refunded.personal_charged_mileage, 300);
}

#[tokio::test]
async fn operations_on_missing_ledger_fail_not_found() {
    let (_store, service) = service();
    assert!(matches!(
        service.consume(5, 10, None).await,
        Err(MileageError::LedgerNotFound(5))
    ));
    assert!(matches!(
        service.refund(5, 10).await,
        Err(MileageError::LedgerNotFound(5))
    ));
}

#[tokio::test]
async fn negative_amounts_are_rejected_without_side_effects() {
    let (store, service) = service();
    seed(&store, 1, 100, 100);

    assert!(matches!(
        service.consume(1, -10, None).await,
        Err(MileageError::InvalidAmount(-10))
    ));
    assert!(matches!(
        service.refund(1, -10).await,
        Err(MileageError::InvalidAmount(-10))
    ));
    assert_eq!(service.get_ledger(1).await.unwrap().total(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_consumption_never_overdraws() {
    let (store, service) = service();
    seed(&store, 1, 600, 400);

    let attempts = (0..150).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.consume(1, 10, None).await.is_ok() })
    });
    let mut succeeded = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        if attempt.await.unwrap() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 100);
    let ledger = service.get_ledger(1).await.unwrap();
    assert_eq!(ledger.annual_mileage, 0);
    assert_eq!(ledger.personal_charged_mileage, 0);
}

#[tokio::test]
async fn balances_stay_non_negative_across_mixed_operations() {
    let (store, service) = service();
    seed(&store, 1, 300, 200);

    let steps: [(&str, i64); 8] = [
        ("consume", 250),
        ("refund", 50),
        ("consume", 200),
        ("consume", 1000),
        ("refund", 0),
        ("consume", 100),
        ("consume", 1),
        ("refund", 10),
    ];
    for (op, amount) in steps {
        let _ = match op {
            "consume" => service.consume(1, amount, None).await,
            _ => service.refund(1, amount).await,
        };
        let ledger = service.get_ledger(1).await.unwrap();
        assert!(ledger.annual_mileage >= 0, "after {op} {amount}");
        assert!(ledger.personal_charged_mileage >= 0, "after {op} {amount}");
    }
}

#[tokio::test]
async fn consume_works_when_buckets_sum_past_i64_max() {
    let (_store, service) = service();
    service.create_ledger(1).await.unwrap();
    let request = service.submit_charge_request(1, 1000, "Kim").await.unwrap();
    service.process_charge_request(request.id, true).await.unwrap();
    service.refund(1, i64::MAX - 10).await.unwrap();

    let ledger = service.consume(1, 5, Some("order")).await.unwrap();
    assert_eq!(ledger.annual_mileage, i64::MAX - 15);
    assert_eq!(ledger.personal_charged_mileage, 1000);
}
