use async_trait::async_trait;

use crate::error::MileageResult;

use super::models::{
    ChargeRequest, ChargeRequestFilter, MileageLedger, NewChargeRequest, Page, PageRequest,
    SortOption,
};
use super::transition::Transition;

/// Read-modify-write step applied to one ledger under exclusive access.
/// Returning an error discards the modification.
pub type LedgerMutation = Box<dyn FnOnce(&mut MileageLedger) -> MileageResult<()> + Send>;

/// Decides the next status of a charge request and applies the matching
/// change to its owner's ledger. Returning an error discards both.
pub type ChargeMutation =
    Box<dyn FnOnce(&ChargeRequest, &mut MileageLedger) -> MileageResult<Transition> + Send>;

/// key: ledger-store -> durable balance records keyed by user
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fails with `LedgerAlreadyExists` when a ledger for the user is present.
    async fn insert_ledger(&self, ledger: MileageLedger) -> MileageResult<MileageLedger>;

    async fn get_ledger(&self, user_id: i64) -> MileageResult<Option<MileageLedger>>;

    /// Returns whether a ledger was removed.
    async fn delete_ledger(&self, user_id: i64) -> MileageResult<bool>;

    /// Locks the ledger, applies `mutation` and writes the result with a fresh
    /// `updated_at`. Fails with `LedgerNotFound` when absent.
    async fn update_ledger(
        &self,
        user_id: i64,
        mutation: LedgerMutation,
    ) -> MileageResult<MileageLedger>;

    /// Ascending user ids strictly after `after`, at most `limit` of them.
    async fn list_ledger_ids(&self, after: Option<i64>, limit: i64) -> MileageResult<Vec<i64>>;

    /// Records that `job` runs for `period`. `Ok(false)` when the period was
    /// already claimed, by this process or an earlier one.
    async fn claim_accrual_period(&self, job: &str, period: &str) -> MileageResult<bool>;

    /// Drops a claim so a failed run can be retried.
    async fn release_accrual_period(&self, job: &str, period: &str) -> MileageResult<()>;
}

/// key: charge-request-store -> historical top-up requests
#[async_trait]
pub trait ChargeRequestStore: Send + Sync {
    async fn insert_request(&self, request: NewChargeRequest) -> MileageResult<ChargeRequest>;

    async fn get_request(&self, id: i64) -> MileageResult<Option<ChargeRequest>>;

    /// Locks the request and then its owner's ledger, runs `mutation` and
    /// writes the new status and ledger together, or neither. Nothing is
    /// written for a no-op transition. Fails with `ChargeRequestNotFound` or
    /// `LedgerNotFound` when either record is absent.
    async fn update_request_with_ledger(
        &self,
        request_id: i64,
        mutation: ChargeMutation,
    ) -> MileageResult<(ChargeRequest, Transition)>;

    async fn query_requests(
        &self,
        filter: &ChargeRequestFilter,
        sort: SortOption,
        page: PageRequest,
    ) -> MileageResult<Page<ChargeRequest>>;
}
