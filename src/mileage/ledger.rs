use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::{MileageError, MileageResult};

use super::models::MileageLedger;

/// Absolute value the annual reset writes into every ledger.
pub const ANNUAL_MILEAGE: i64 = 1_000_000;

/// Quarterly accrual per full year of tenure.
pub const TENURE_MILEAGE_PER_YEAR: i64 = 10_000;

impl MileageLedger {
    pub fn new(user_id: i64, join_date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            annual_mileage: 0,
            personal_charged_mileage: 0,
            join_date,
            updated_at: now,
        }
    }

    /// Combined balance, saturating at `i64::MAX`. Any valid amount fits a
    /// saturated total.
    pub fn total(&self) -> i64 {
        self.annual_mileage
            .saturating_add(self.personal_charged_mileage)
    }

    /// Spends the annual bucket first and takes any shortfall from the
    /// personal bucket. Leaves the ledger untouched on error.
    pub fn consume(&mut self, amount: i64) -> MileageResult<()> {
        ensure_non_negative(amount)?;
        let available = self.total();
        if amount > available {
            return Err(MileageError::InsufficientBalance {
                user_id: self.user_id,
                requested: amount,
                available,
            });
        }

        let remaining = self.annual_mileage - amount;
        if remaining < 0 {
            self.annual_mileage = 0;
            self.personal_charged_mileage += remaining;
        } else {
            self.annual_mileage = remaining;
        }
        Ok(())
    }

    /// Refunds always land in the annual bucket, whichever bucket paid.
    pub fn refund(&mut self, amount: i64) -> MileageResult<()> {
        ensure_non_negative(amount)?;
        self.annual_mileage = checked(self.annual_mileage.checked_add(amount), amount)?;
        Ok(())
    }

    /// Applies a signed charge-request delta to the personal bucket.
    pub fn adjust_personal(&mut self, delta: i64) -> MileageResult<()> {
        let next = checked(self.personal_charged_mileage.checked_add(delta), delta)?;
        if next < 0 {
            return Err(MileageError::InsufficientBalance {
                user_id: self.user_id,
                requested: -delta,
                available: self.personal_charged_mileage,
            });
        }
        self.personal_charged_mileage = next;
        Ok(())
    }

    pub fn reset_annual(&mut self) {
        self.annual_mileage = ANNUAL_MILEAGE;
    }

    /// Adds the tenure accrual for `today` and returns the amount granted.
    pub fn accrue_tenure(&mut self, today: NaiveDate) -> MileageResult<i64> {
        let grant = tenure_years(self.join_date, today) * TENURE_MILEAGE_PER_YEAR;
        self.annual_mileage = checked(self.annual_mileage.checked_add(grant), grant)?;
        Ok(grant)
    }
}

/// Whole years between `join_date` and `today`; zero before the first anniversary.
pub fn tenure_years(join_date: NaiveDate, today: NaiveDate) -> i64 {
    let mut years = i64::from(today.year() - join_date.year());
    if (today.month(), today.day()) < (join_date.month(), join_date.day()) {
        years -= 1;
    }
    years.max(0)
}

pub(crate) fn ensure_non_negative(amount: i64) -> MileageResult<()> {
    if amount < 0 {
        return Err(MileageError::InvalidAmount(amount));
    }
    Ok(())
}

fn checked(value: Option<i64>, amount: i64) -> MileageResult<i64> {
    value.ok_or(MileageError::InvalidAmount(amount))
}
