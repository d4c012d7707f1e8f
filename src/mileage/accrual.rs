use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{MileageError, MileageResult};

use super::ledger::ANNUAL_MILEAGE;
use super::models::MileageLedger;
use super::service::MileageService;
use super::store::LedgerMutation;

/// Per-record outcome counts of one batch accrual run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccrualReport {
    pub processed: u64,
    /// Ledgers deleted between listing and update.
    pub skipped: u64,
    pub failed: u64,
}

impl MileageService {
    /// Sets every ledger's annual bucket to `ANNUAL_MILEAGE`. Re-running is harmless.
    pub async fn charge_annual_mileage(&self) -> MileageResult<AccrualReport> {
        let report = self
            .for_each_ledger("annual", || -> LedgerMutation {
                Box::new(|ledger: &mut MileageLedger| {
                    ledger.reset_annual();
                    Ok(())
                })
            })
            .await?;
        info!(?report, amount = ANNUAL_MILEAGE, "annual mileage charge finished");
        Ok(report)
    }

    pub async fn charge_quarterly_mileage_based_on_tenure(&self) -> MileageResult<AccrualReport> {
        self.charge_quarterly_mileage_on(Utc::now().date_naive()).await
    }

    /// Adds the tenure grant for `today` to every ledger. Additive: each call
    /// grants again, so callers must run it once per quarter.
    pub async fn charge_quarterly_mileage_on(
        &self,
        today: NaiveDate,
    ) -> MileageResult<AccrualReport> {
        let report = self
            .for_each_ledger("tenure", move || -> LedgerMutation {
                Box::new(move |ledger: &mut MileageLedger| {
                    ledger.accrue_tenure(today).map(|_| ())
                })
            })
            .await?;
        info!(?report, %today, "quarterly tenure mileage charge finished");
        Ok(report)
    }

    async fn for_each_ledger<F>(
        &self,
        job: &'static str,
        mutation: F,
    ) -> MileageResult<AccrualReport>
    where
        F: Fn() -> LedgerMutation,
    {
        let mut report = AccrualReport::default();
        let mut cursor = None;

        loop {
            let user_ids = self.ledgers.list_ledger_ids(cursor, self.batch_size).await?;
            let Some(last) = user_ids.last().copied() else {
                break;
            };

            for user_id in user_ids {
                match self.ledgers.update_ledger(user_id, mutation()).await {
                    Ok(ledger) => {
                        report.processed += 1;
                        debug!(
                            job,
                            user_id,
                            annual_mileage = ledger.annual_mileage,
                            "accrued mileage"
                        );
                    }
                    Err(MileageError::LedgerNotFound(_)) => {
                        report.skipped += 1;
                    }
                    Err(err) => {
                        report.failed += 1;
                        warn!(?err, job, user_id, "mileage accrual failed for ledger");
                    }
                }
            }

            cursor = Some(last);
        }

        Ok(report)
    }
}
