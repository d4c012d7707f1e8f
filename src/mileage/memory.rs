use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::error::{MileageError, MileageResult};

use super::models::{
    ChargeRequest, ChargeRequestFilter, MileageLedger, NewChargeRequest, Page, PageRequest,
    SortOption,
};
use super::store::{ChargeMutation, ChargeRequestStore, LedgerMutation, LedgerStore};
use super::transition::Transition;

/// In-process store backing tests and `MILEAGE_STORE=memory`.
///
/// Ledger updates run while holding the entry's shard lock, so concurrent
/// mutations of the same user are serialised and different users proceed
/// independently. Charge processing holds the request entry, then the ledger
/// entry; nothing locks them in the other order.
#[derive(Debug, Default)]
pub struct MemoryMileageStore {
    ledgers: DashMap<i64, MileageLedger>,
    requests: DashMap<i64, ChargeRequest>,
    next_request_id: AtomicI64,
    accrual_claims: DashSet<(String, String)>,
}

impl MemoryMileageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a ledger as-is, replacing any existing record. Lets callers
    /// seed balances and join dates directly.
    pub fn put_ledger(&self, ledger: MileageLedger) {
        self.ledgers.insert(ledger.user_id, ledger);
    }

    /// Writes a request as-is, keeping its id and status.
    pub fn put_request(&self, request: ChargeRequest) {
        self.next_request_id
            .fetch_max(request.id, AtomicOrdering::SeqCst);
        self.requests.insert(request.id, request);
    }
}

#[async_trait]
impl LedgerStore for MemoryMileageStore {
    async fn insert_ledger(&self, ledger: MileageLedger) -> MileageResult<MileageLedger> {
        match self.ledgers.entry(ledger.user_id) {
            Entry::Occupied(_) => Err(MileageError::LedgerAlreadyExists(ledger.user_id)),
            Entry::Vacant(slot) => {
                let stored = MileageLedger {
                    updated_at: Utc::now(),
                    ..ledger
                };
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn get_ledger(&self, user_id: i64) -> MileageResult<Option<MileageLedger>> {
        Ok(self.ledgers.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn delete_ledger(&self, user_id: i64) -> MileageResult<bool> {
        Ok(self.ledgers.remove(&user_id).is_some())
    }

    async fn update_ledger(
        &self,
        user_id: i64,
        mutation: LedgerMutation,
    ) -> MileageResult<MileageLedger> {
        let mut entry = self
            .ledgers
            .get_mut(&user_id)
            .ok_or(MileageError::LedgerNotFound(user_id))?;
        let mut draft = entry.value().clone();
        mutation(&mut draft)?;
        draft.updated_at = Utc::now();
        *entry.value_mut() = draft.clone();
        Ok(draft)
    }

    async fn list_ledger_ids(&self, after: Option<i64>, limit: i64) -> MileageResult<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .ledgers
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| after.map_or(true, |after| *id > after))
            .collect();
        ids.sort_unstable();
        ids.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(ids)
    }

    async fn claim_accrual_period(&self, job: &str, period: &str) -> MileageResult<bool> {
        Ok(self
            .accrual_claims
            .insert((job.to_string(), period.to_string())))
    }

    async fn release_accrual_period(&self, job: &str, period: &str) -> MileageResult<()> {
        self.accrual_claims
            .remove(&(job.to_string(), period.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ChargeRequestStore for MemoryMileageStore {
    async fn insert_request(&self, request: NewChargeRequest) -> MileageResult<ChargeRequest> {
        let id = self.next_request_id.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let stored = request.into_request(id);
        self.requests.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_request(&self, id: i64) -> MileageResult<Option<ChargeRequest>> {
        Ok(self.requests.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_request_with_ledger(
        &self,
        request_id: i64,
        mutation: ChargeMutation,
    ) -> MileageResult<(ChargeRequest, Transition)> {
        let mut request = self
            .requests
            .get_mut(&request_id)
            .ok_or(MileageError::ChargeRequestNotFound(request_id))?;
        let user_id = request.user_id;
        let mut ledger = self
            .ledgers
            .get_mut(&user_id)
            .ok_or(MileageError::LedgerNotFound(user_id))?;

        let mut draft = ledger.value().clone();
        let transition = mutation(request.value(), &mut draft)?;
        if !transition.is_noop() {
            draft.updated_at = Utc::now();
            *ledger.value_mut() = draft;
            request.status = transition.to;
        }
        Ok((request.value().clone(), transition))
    }

    async fn query_requests(
        &self,
        filter: &ChargeRequestFilter,
        sort: SortOption,
        page: PageRequest,
    ) -> MileageResult<Page<ChargeRequest>> {
        let mut matching: Vec<ChargeRequest> = self
            .requests
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| compare_requests(a, b, sort));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset.max(0) as usize)
            .take(page.limit.max(0) as usize)
            .collect();

        Ok(Page {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }
}

fn compare_requests(a: &ChargeRequest, b: &ChargeRequest, sort: SortOption) -> Ordering {
    match sort {
        SortOption::Recent => b
            .request_date
            .cmp(&a.request_date)
            .then_with(|| b.id.cmp(&a.id)),
        SortOption::Oldest => a
            .request_date
            .cmp(&b.request_date)
            .then_with(|| a.id.cmp(&b.id)),
        SortOption::MileageAsc => a
            .requested_mileage
            .cmp(&b.requested_mileage)
            .then_with(|| a.id.cmp(&b.id)),
        SortOption::MileageDesc => b
            .requested_mileage
            .cmp(&a.requested_mileage)
            .then_with(|| b.id.cmp(&a.id)),
    }
}
