use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row, Transaction};

use crate::error::{MileageError, MileageResult};

use super::models::{
    ChargeRequest, ChargeRequestFilter, ChargeRequestStatus, MileageLedger, NewChargeRequest,
    Page, PageRequest, SortOption,
};
use super::store::{ChargeMutation, ChargeRequestStore, LedgerMutation, LedgerStore};
use super::transition::Transition;

const LEDGER_COLUMNS: &str =
    "user_id, annual_mileage, personal_charged_mileage, join_date, updated_at";
const REQUEST_COLUMNS: &str =
    "id, user_id, status, request_date, depositor_name, requested_mileage";

/// key: mileage-postgres -> ledger and charge-request tables
#[derive(Clone)]
pub struct PgMileageStore {
    pool: PgPool,
}

impl PgMileageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ChargeRequestRow {
    id: i64,
    user_id: i64,
    status: String,
    request_date: DateTime<Utc>,
    depositor_name: String,
    requested_mileage: i64,
}

impl TryFrom<ChargeRequestRow> for ChargeRequest {
    type Error = MileageError;

    fn try_from(row: ChargeRequestRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<ChargeRequestStatus>()
            .map_err(|message| MileageError::Database(sqlx::Error::Decode(message.into())))?;
        Ok(ChargeRequest {
            id: row.id,
            user_id: row.user_id,
            status,
            request_date: row.request_date,
            depositor_name: row.depositor_name,
            requested_mileage: row.requested_mileage,
        })
    }
}

#[async_trait]
impl LedgerStore for PgMileageStore {
    async fn insert_ledger(&self, ledger: MileageLedger) -> MileageResult<MileageLedger> {
        let inserted = sqlx::query_as::<_, MileageLedger>(&format!(
            r#"
            INSERT INTO mileage_ledgers (user_id, annual_mileage, personal_charged_mileage, join_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING {LEDGER_COLUMNS}
            "#
        ))
        .bind(ledger.user_id)
        .bind(ledger.annual_mileage)
        .bind(ledger.personal_charged_mileage)
        .bind(ledger.join_date)
        .fetch_optional(&self.pool)
        .await?;

        inserted.ok_or(MileageError::LedgerAlreadyExists(ledger.user_id))
    }

    async fn get_ledger(&self, user_id: i64) -> MileageResult<Option<MileageLedger>> {
        let ledger = sqlx::query_as::<_, MileageLedger>(&format!(
            "SELECT {LEDGER_COLUMNS} FROM mileage_ledgers WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ledger)
    }

    async fn delete_ledger(&self, user_id: i64) -> MileageResult<bool> {
        let result = sqlx::query("DELETE FROM mileage_ledgers WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_ledger(
        &self,
        user_id: i64,
        mutation: LedgerMutation,
    ) -> MileageResult<MileageLedger> {
        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_ledger(&mut tx, user_id)
            .await?
            .ok_or(MileageError::LedgerNotFound(user_id))?;

        // Dropping `tx` on error rolls back and releases the row lock.
        mutation(&mut ledger)?;

        let updated = write_ledger(&mut tx, &ledger).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn list_ledger_ids(&self, after: Option<i64>, limit: i64) -> MileageResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT user_id FROM mileage_ledgers
            WHERE ($1::BIGINT IS NULL OR user_id > $1)
            ORDER BY user_id ASC
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn claim_accrual_period(&self, job: &str, period: &str) -> MileageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO accrual_runs (job, period)
            VALUES ($1, $2)
            ON CONFLICT (job, period) DO NOTHING
            "#,
        )
        .bind(job)
        .bind(period)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_accrual_period(&self, job: &str, period: &str) -> MileageResult<()> {
        sqlx::query("DELETE FROM accrual_runs WHERE job = $1 AND period = $2")
            .bind(job)
            .bind(period)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChargeRequestStore for PgMileageStore {
    async fn insert_request(&self, request: NewChargeRequest) -> MileageResult<ChargeRequest> {
        let row = sqlx::query_as::<_, ChargeRequestRow>(&format!(
            r#"
            INSERT INTO charge_requests (user_id, status, request_date, depositor_name, requested_mileage)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request.user_id)
        .bind(ChargeRequestStatus::Requested.as_str())
        .bind(request.request_date)
        .bind(&request.depositor_name)
        .bind(request.requested_mileage)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_request(&self, id: i64) -> MileageResult<Option<ChargeRequest>> {
        let row = sqlx::query_as::<_, ChargeRequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM charge_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ChargeRequest::try_from).transpose()
    }

    async fn update_request_with_ledger(
        &self,
        request_id: i64,
        mutation: ChargeMutation,
    ) -> MileageResult<(ChargeRequest, Transition)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ChargeRequestRow>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM charge_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(request_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or(MileageError::ChargeRequestNotFound(request_id))?;
        let mut request = ChargeRequest::try_from(row)?;

        let mut ledger = lock_ledger(&mut tx, request.user_id)
            .await?
            .ok_or(MileageError::LedgerNotFound(request.user_id))?;

        let transition = mutation(&request, &mut ledger)?;
        if transition.is_noop() {
            tx.rollback().await?;
            return Ok((request, transition));
        }

        write_ledger(&mut tx, &ledger).await?;
        sqlx::query("UPDATE charge_requests SET status = $2 WHERE id = $1")
            .bind(request_id)
            .bind(transition.to.as_str())
            .execute(&mut tx)
            .await?;
        tx.commit().await?;

        request.status = transition.to;
        Ok((request, transition))
    }

    async fn query_requests(
        &self,
        filter: &ChargeRequestFilter,
        sort: SortOption,
        page: PageRequest,
    ) -> MileageResult<Page<ChargeRequest>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM charge_requests");
        push_filter(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get(0)?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {REQUEST_COLUMNS} FROM charge_requests"
        ));
        push_filter(&mut select, filter);
        select.push(order_clause(sort));
        select.push(" LIMIT ").push_bind(page.limit);
        select.push(" OFFSET ").push_bind(page.offset);

        let items = select
            .build_query_as::<ChargeRequestRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ChargeRequest::try_from)
            .collect::<MileageResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }
}

async fn lock_ledger(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
) -> MileageResult<Option<MileageLedger>> {
    let ledger = sqlx::query_as::<_, MileageLedger>(&format!(
        "SELECT {LEDGER_COLUMNS} FROM mileage_ledgers WHERE user_id = $1 FOR UPDATE"
    ))
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;
    Ok(ledger)
}

async fn write_ledger(
    tx: &mut Transaction<'_, Postgres>,
    ledger: &MileageLedger,
) -> MileageResult<MileageLedger> {
    let updated = sqlx::query_as::<_, MileageLedger>(&format!(
        r#"
        UPDATE mileage_ledgers
        SET annual_mileage = $2,
            personal_charged_mileage = $3,
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING {LEDGER_COLUMNS}
        "#
    ))
    .bind(ledger.user_id)
    .bind(ledger.annual_mileage)
    .bind(ledger.personal_charged_mileage)
    .fetch_one(&mut *tx)
    .await?;
    Ok(updated)
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &ChargeRequestFilter) {
    builder.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    let (from, until) = filter.request_window();
    if let Some(from) = from {
        builder.push(" AND request_date >= ").push_bind(from);
    }
    if let Some(until) = until {
        builder.push(" AND request_date < ").push_bind(until);
    }
    if let Some(depositor) = &filter.depositor_name {
        builder
            .push(" AND depositor_name = ")
            .push_bind(depositor.clone());
    }
}

fn order_clause(sort: SortOption) -> &'static str {
    match sort {
        SortOption::Recent => " ORDER BY request_date DESC, id DESC",
        SortOption::Oldest => " ORDER BY request_date ASC, id ASC",
        SortOption::MileageAsc => " ORDER BY requested_mileage ASC, id ASC",
        SortOption::MileageDesc => " ORDER BY requested_mileage DESC, id DESC",
    }
}
