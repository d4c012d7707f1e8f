use std::future::Future;

use chrono::{Datelike, NaiveDate, Utc};
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::config;
use crate::error::MileageResult;

use super::accrual::AccrualReport;
use super::service::MileageService;

/// Periods this scheduler instance has seen charged. The store's accrual
/// claims decide whether a period runs; this only saves the round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccrualSchedule {
    pub last_annual_year: Option<i32>,
    pub last_quarter: Option<(i32, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub annual: Option<AccrualReport>,
    pub quarterly: Option<AccrualReport>,
}

impl AccrualSchedule {
    pub fn annual_due(&self, today: NaiveDate) -> bool {
        today.month() == 1 && today.day() == 1 && self.last_annual_year != Some(today.year())
    }

    pub fn quarterly_due(&self, today: NaiveDate) -> bool {
        today.day() == 1
            && matches!(today.month(), 1 | 4 | 7 | 10)
            && self.last_quarter != Some(quarter_of(today))
    }
}

fn quarter_of(date: NaiveDate) -> (i32, u32) {
    (date.year(), (date.month() - 1) / 3 + 1)
}

/// key: accrual-scheduler -> annual reset and quarterly tenure grants
pub fn spawn(service: MileageService) {
    let interval = Duration::from_secs(*config::MILEAGE_ACCRUAL_SCAN_INTERVAL_SECS);

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        let mut schedule = AccrualSchedule::default();
        loop {
            ticker.tick().await;
            let today = Utc::now().date_naive();
            process_tick(&service, today, &mut schedule).await;
        }
    });
}

/// key: accrual-scheduler -> tick handler
///
/// Each period is claimed in the ledger store before its job runs, so a
/// restarted or second instance does not charge it again. A job that fails
/// releases its claim and is retried on the next tick of the same day.
pub async fn process_tick(
    service: &MileageService,
    today: NaiveDate,
    schedule: &mut AccrualSchedule,
) -> TickOutcome {
    let mut outcome = TickOutcome::default();

    if schedule.annual_due(today) {
        let period = today.year().to_string();
        let run = service.charge_annual_mileage();
        match run_claimed(service, ANNUAL_JOB, &period, run).await {
            PeriodRun::Ran(report) => {
                info!(year = today.year(), ?report, "scheduled annual mileage charge completed");
                schedule.last_annual_year = Some(today.year());
                outcome.annual = Some(report);
            }
            PeriodRun::AlreadyClaimed => schedule.last_annual_year = Some(today.year()),
            PeriodRun::Failed => {}
        }
    }

    // The annual reset must land before the tenure grant on 1 January.
    if schedule.quarterly_due(today) && !schedule.annual_due(today) {
        let (year, quarter) = quarter_of(today);
        let period = format!("{year}-Q{quarter}");
        let run = service.charge_quarterly_mileage_on(today);
        match run_claimed(service, TENURE_JOB, &period, run).await {
            PeriodRun::Ran(report) => {
                info!(year, quarter, ?report, "scheduled tenure mileage charge completed");
                schedule.last_quarter = Some((year, quarter));
                outcome.quarterly = Some(report);
            }
            PeriodRun::AlreadyClaimed => schedule.last_quarter = Some((year, quarter)),
            PeriodRun::Failed => {}
        }
    }

    if outcome == TickOutcome::default() {
        debug!(%today, "no mileage accrual due");
    }
    outcome
}

const ANNUAL_JOB: &str = "annual";
const TENURE_JOB: &str = "tenure";

enum PeriodRun {
    Ran(AccrualReport),
    AlreadyClaimed,
    Failed,
}

async fn run_claimed<F>(service: &MileageService, job: &str, period: &str, run: F) -> PeriodRun
where
    F: Future<Output = MileageResult<AccrualReport>>,
{
    match service.ledgers.claim_accrual_period(job, period).await {
        Ok(true) => {}
        Ok(false) => {
            info!(job, period, "mileage accrual period already charged");
            return PeriodRun::AlreadyClaimed;
        }
        Err(err) => {
            warn!(?err, job, period, "failed to claim mileage accrual period");
            return PeriodRun::Failed;
        }
    }

    match run.await {
        Ok(report) => PeriodRun::Ran(report),
        Err(err) => {
            warn!(?err, job, period, "scheduled mileage accrual failed");
            if let Err(err) = service.ledgers.release_accrual_period(job, period).await {
                error!(?err, job, period, "failed to release mileage accrual claim");
            }
            PeriodRun::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn annual_is_due_once_on_new_year() {
        let mut schedule = AccrualSchedule::default();
        assert!(schedule.annual_due(date(2025, 1, 1)));
        assert!(!schedule.annual_due(date(2025, 1, 2)));
        schedule.last_annual_year = Some(2025);
        assert!(!schedule.annual_due(date(2025, 1, 1)));
        assert!(schedule.annual_due(date(2026, 1, 1)));
    }

    #[test]
    fn quarterly_is_due_on_quarter_starts() {
        let schedule = AccrualSchedule::default();
        for month in [1, 4, 7, 10] {
            assert!(schedule.quarterly_due(date(2025, month, 1)), "month {month}");
        }
        assert!(!schedule.quarterly_due(date(2025, 2, 1)));
        assert!(!schedule.quarterly_due(date(2025, 4, 2)));
    }

    #[test]
    fn quarterly_guard_tracks_year_and_quarter() {
        let schedule = AccrualSchedule {
            last_annual_year: None,
            last_quarter: Some((2025, 2)),
        };
        assert!(!schedule.quarterly_due(date(2025, 4, 1)));
        assert!(schedule.quarterly_due(date(2025, 7, 1)));
        assert!(schedule.quarterly_due(date(2026, 4, 1)));
    }
}
