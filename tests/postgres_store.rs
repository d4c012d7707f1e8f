use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use mileage_server::mileage::{
    ChargeRequestFilter, ChargeRequestStatus, LedgerStore, MileageService, PgMileageStore,
    PageRequest, SortOption,
};
use mileage_server::MileageError;
use sqlx::PgPool;

fn service(pool: &PgPool) -> MileageService {
    let store = Arc::new(PgMileageStore::new(pool.clone()));
    MileageService::new(store.clone(), store).with_batch_size(2)
}

// key: postgres-store-tests -> ledger locking,toggle,accrual
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn postgres_ledger_round_trip(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let service = service(&pool);

    let created = service.create_ledger(1).await.unwrap();
    assert_eq!(created.join_date, Utc::now().date_naive());
    assert!(matches!(
        service.create_ledger(1).await,
        Err(MileageError::LedgerAlreadyExists(1))
    ));

    service.refund(1, 1000).await.unwrap();
    let request = service.submit_charge_request(1, 500, "Kim").await.unwrap();
    service.process_charge_request(request.id, true).await.unwrap();

    let spent = service.consume(1, 1200, None).await.unwrap();
    assert_eq!(spent.annual_mileage, 0);
    assert_eq!(spent.personal_charged_mileage, 300);

    let err = service.consume(1, 301, None).await.unwrap_err();
    assert!(matches!(err, MileageError::InsufficientBalance { .. }));

    service.delete_ledger(1).await.unwrap();
    assert!(matches!(
        service.get_ledger(1).await,
        Err(MileageError::LedgerNotFound(1))
    ));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn postgres_toggle_and_query(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let service = service(&pool);
    service.create_ledger(5).await.unwrap();

    let first = service.submit_charge_request(5, 1000, "Kim").await.unwrap();
    let second = service.submit_charge_request(5, 3000, "Lee").await.unwrap();

    service.process_charge_request(first.id, true).await.unwrap();
    service.process_charge_request(first.id, true).await.unwrap();
    assert_eq!(
        service.get_ledger(5).await.unwrap().personal_charged_mileage,
        1000
    );
    let rejected = service.process_charge_request(first.id, false).await.unwrap();
    assert_eq!(rejected.status, ChargeRequestStatus::Rejected);
    assert_eq!(
        service.get_ledger(5).await.unwrap().personal_charged_mileage,
        0
    );

    let today = Utc::now().date_naive();
    let filter = ChargeRequestFilter {
        user_id: Some(5),
        start_date: Some(today - Duration::days(1)),
        end_date: Some(today),
        ..Default::default()
    };
    let page = service
        .query_charge_requests(&filter, SortOption::MileageDesc, PageRequest::new(0, 1, 10))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, second.id);

    let rejected_only = ChargeRequestFilter {
        status: Some(ChargeRequestStatus::Rejected),
        ..Default::default()
    };
    let page = service
        .query_charge_requests(&rejected_only, SortOption::Recent, PageRequest::new(0, 10, 10))
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, first.id);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn postgres_accrual_walks_all_pages(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = PgMileageStore::new(pool.clone());
    let service = service(&pool);

    for user_id in 1..=5_i64 {
        sqlx::query(
            "INSERT INTO mileage_ledgers (user_id, annual_mileage, personal_charged_mileage, join_date) VALUES ($1, $2, 0, $3)",
        )
        .bind(user_id)
        .bind(user_id * 100)
        .bind(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
        .execute(&pool)
        .await
        .unwrap();
    }

    let ids = store.list_ledger_ids(Some(2), 10).await.unwrap();
    assert_eq!(ids, vec![3, 4, 5]);

    let report = service.charge_annual_mileage().await.unwrap();
    assert_eq!(report.processed, 5);

    let report = service
        .charge_quarterly_mileage_on(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap())
        .await
        .unwrap();
    assert_eq!(report.processed, 5);

    let balances: Vec<i64> =
        sqlx::query_scalar("SELECT annual_mileage FROM mileage_ledgers ORDER BY user_id")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert!(balances.iter().all(|balance| *balance == 1_040_000));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn postgres_failed_status_write_rolls_back_ledger(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let service = service(&pool);
    service.create_ledger(9).await.unwrap();
    let request = service.submit_charge_request(9, 1000, "Kim").await.unwrap();

    sqlx::query(
        r#"
        CREATE FUNCTION refuse_status_write() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'status writes disabled';
        END;
        $$ LANGUAGE plpgsql
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER refuse_status_write BEFORE UPDATE ON charge_requests FOR EACH ROW EXECUTE FUNCTION refuse_status_write()",
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = service
        .process_charge_request(request.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, MileageError::Database(_)));
    assert_eq!(
        service.get_ledger(9).await.unwrap().personal_charged_mileage,
        0
    );

    sqlx::query("DROP TRIGGER refuse_status_write ON charge_requests")
        .execute(&pool)
        .await
        .unwrap();

    let approved = service.process_charge_request(request.id, true).await.unwrap();
    assert_eq!(approved.status, ChargeRequestStatus::Approved);
    assert_eq!(
        service.get_ledger(9).await.unwrap().personal_charged_mileage,
        1000
    );
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn postgres_accrual_claims_are_exclusive(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let store = PgMileageStore::new(pool.clone());

    assert!(store.claim_accrual_period("tenure", "2024-Q2").await.unwrap());
    assert!(!store.claim_accrual_period("tenure", "2024-Q2").await.unwrap());
    assert!(store.claim_accrual_period("annual", "2024").await.unwrap());

    store
        .release_accrual_period("tenure", "2024-Q2")
        .await
        .unwrap();
    assert!(store.claim_accrual_period("tenure", "2024-Q2").await.unwrap());
}
