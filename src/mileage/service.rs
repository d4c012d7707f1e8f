use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{MileageError, MileageResult};

use super::directory::{lookup_each, UserDirectory};
use super::ledger::ensure_non_negative;
use super::models::{
    ChargeRequest, ChargeRequestDetail, ChargeRequestFilter, MileageLedger, NewChargeRequest,
    Page, PageRequest, SortOption, UserProfile,
};
use super::store::{ChargeMutation, ChargeRequestStore, LedgerStore};
use super::transition::Transition;

const DEFAULT_BATCH_SIZE: i64 = 500;

/// key: mileage-service -> ledger, approval engine, query layer
#[derive(Clone)]
pub struct MileageService {
    pub(super) ledgers: Arc<dyn LedgerStore>,
    requests: Arc<dyn ChargeRequestStore>,
    directory: Option<Arc<dyn UserDirectory>>,
    pub(super) batch_size: i64,
}

impl MileageService {
    pub fn new(ledgers: Arc<dyn LedgerStore>, requests: Arc<dyn ChargeRequestStore>) -> Self {
        Self {
            ledgers,
            requests,
            directory: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_user_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn create_ledger(&self, user_id: i64) -> MileageResult<MileageLedger> {
        let now = Utc::now();
        let ledger = self
            .ledgers
            .insert_ledger(MileageLedger::new(user_id, now.date_naive(), now))
            .await?;
        info!(user_id, join_date = %ledger.join_date, "created mileage ledger");
        Ok(ledger)
    }

    pub async fn get_ledger(&self, user_id: i64) -> MileageResult<MileageLedger> {
        self.ledgers
            .get_ledger(user_id)
            .await?
            .ok_or(MileageError::LedgerNotFound(user_id))
    }

    pub async fn delete_ledger(&self, user_id: i64) -> MileageResult<()> {
        if !self.ledgers.delete_ledger(user_id).await? {
            return Err(MileageError::LedgerNotFound(user_id));
        }
        info!(user_id, "deleted mileage ledger");
        Ok(())
    }

    pub async fn consume(
        &self,
        user_id: i64,
        amount: i64,
        reason: Option<&str>,
    ) -> MileageResult<MileageLedger> {
        ensure_non_negative(amount)?;
        let ledger = self
            .ledgers
            .update_ledger(
                user_id,
                Box::new(move |ledger: &mut MileageLedger| ledger.consume(amount)),
            )
            .await?;
        info!(
            user_id,
            amount,
            reason = reason.unwrap_or(""),
            remaining = ledger.total(),
            "consumed mileage"
        );
        Ok(ledger)
    }

    pub async fn refund(&self, user_id: i64, amount: i64) -> MileageResult<MileageLedger> {
        ensure_non_negative(amount)?;
        let ledger = self
            .ledgers
            .update_ledger(
                user_id,
                Box::new(move |ledger: &mut MileageLedger| ledger.refund(amount)),
            )
            .await?;
        info!(user_id, amount, remaining = ledger.total(), "refunded mileage");
        Ok(ledger)
    }

    pub async fn submit_charge_request(
        &self,
        user_id: i64,
        amount: i64,
        depositor_name: &str,
    ) -> MileageResult<ChargeRequest> {
        ensure_non_negative(amount)?;
        self.get_ledger(user_id).await?;

        let request = self
            .requests
            .insert_request(NewChargeRequest {
                user_id,
                requested_mileage: amount,
                depositor_name: depositor_name.to_string(),
                request_date: Utc::now(),
            })
            .await?;
        info!(
            user_id,
            request_id = request.id,
            amount,
            "submitted mileage charge request"
        );
        Ok(request)
    }

    /// Records `approve` as the outcome of the request and reconciles the
    /// owner's personal bucket with it in the same store transaction. Safe to
    /// retry.
    pub async fn process_charge_request(
        &self,
        request_id: i64,
        approve: bool,
    ) -> MileageResult<ChargeRequest> {
        let decide: ChargeMutation = Box::new(
            move |request: &ChargeRequest, ledger: &mut MileageLedger| -> MileageResult<Transition> {
                let transition = Transition::decide(request.status, approve);
                let delta = transition.personal_delta(request.requested_mileage);
                if delta != 0 {
                    ledger.adjust_personal(delta)?;
                }
                Ok(transition)
            },
        );
        let (request, transition) = self
            .requests
            .update_request_with_ledger(request_id, decide)
            .await?;

        if transition.is_noop() {
            info!(request_id, status = %request.status, "charge request outcome unchanged");
        } else {
            info!(
                request_id,
                user_id = request.user_id,
                from = %transition.from,
                to = %transition.to,
                delta = transition.personal_delta(request.requested_mileage),
                "processed mileage charge request"
            );
        }
        Ok(request)
    }

    pub async fn query_charge_requests(
        &self,
        filter: &ChargeRequestFilter,
        sort: SortOption,
        page: PageRequest,
    ) -> MileageResult<Page<ChargeRequest>> {
        self.requests.query_requests(filter, sort, page).await
    }

    /// Same as `query_charge_requests`, with each result carrying the owner's
    /// directory profile. A failed lookup leaves `user` empty for that owner.
    pub async fn query_charge_request_details(
        &self,
        filter: &ChargeRequestFilter,
        sort: SortOption,
        page: PageRequest,
    ) -> MileageResult<Page<ChargeRequestDetail>> {
        let page = self.query_charge_requests(filter, sort, page).await?;
        let profiles = self.lookup_profiles(&page.items).await;
        Ok(page.map(|request| {
            let user = profiles.get(&request.user_id).cloned();
            ChargeRequestDetail { request, user }
        }))
    }

    async fn lookup_profiles(&self, requests: &[ChargeRequest]) -> HashMap<i64, UserProfile> {
        let Some(directory) = &self.directory else {
            return HashMap::new();
        };

        let mut user_ids: Vec<i64> = requests.iter().map(|request| request.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        if user_ids.is_empty() {
            return HashMap::new();
        }

        match directory.lookup_many(&user_ids).await {
            Ok(profiles) => {
                if profiles.len() < user_ids.len() {
                    warn!(
                        requested = user_ids.len(),
                        found = profiles.len(),
                        "user directory returned fewer profiles than requested"
                    );
                }
                profiles
            }
            Err(err) => {
                warn!(?err, "bulk user lookup failed; looking users up one at a time");
                lookup_each(directory.as_ref(), &user_ids).await
            }
        }
    }
}
