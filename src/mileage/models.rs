use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// key: mileage-ledger-model -> per-user balance buckets
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MileageLedger {
    pub user_id: i64,
    /// Granted by the annual reset and tenure accrual. Spent first.
    pub annual_mileage: i64,
    /// Granted by approved charge requests. Spent once the annual bucket is empty.
    pub personal_charged_mileage: i64,
    pub join_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum ChargeRequestStatus {
    Requested,
    Approved,
    Rejected,
}

impl ChargeRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeRequestStatus::Requested => "REQUESTED",
            ChargeRequestStatus::Approved => "APPROVED",
            ChargeRequestStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ChargeRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeRequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "REQUESTED" => Ok(ChargeRequestStatus::Requested),
            "APPROVED" => Ok(ChargeRequestStatus::Approved),
            "REJECTED" => Ok(ChargeRequestStatus::Rejected),
            other => Err(format!("unknown charge request status `{other}`")),
        }
    }
}

impl TryFrom<String> for ChargeRequestStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// key: charge-request-model -> personal top-up awaiting approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    #[serde(rename = "chargeRequestId")]
    pub id: i64,
    pub user_id: i64,
    pub status: ChargeRequestStatus,
    pub request_date: DateTime<Utc>,
    pub depositor_name: String,
    pub requested_mileage: i64,
}

#[derive(Debug, Clone)]
pub struct NewChargeRequest {
    pub user_id: i64,
    pub requested_mileage: i64,
    pub depositor_name: String,
    pub request_date: DateTime<Utc>,
}

impl NewChargeRequest {
    pub fn into_request(self, id: i64) -> ChargeRequest {
        ChargeRequest {
            id,
            user_id: self.user_id,
            status: ChargeRequestStatus::Requested,
            request_date: self.request_date,
            depositor_name: self.depositor_name,
            requested_mileage: self.requested_mileage,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum SortOption {
    /// Newest request first.
    #[default]
    Recent,
    Oldest,
    MileageAsc,
    MileageDesc,
}

impl FromStr for SortOption {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RECENT" => Ok(SortOption::Recent),
            "OLDEST" => Ok(SortOption::Oldest),
            "MILEAGE_ASC" => Ok(SortOption::MileageAsc),
            "MILEAGE_DESC" => Ok(SortOption::MileageDesc),
            other => Err(format!("unknown sort option `{other}`")),
        }
    }
}

impl TryFrom<String> for SortOption {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Filter over charge requests. Every set field must match.
#[derive(Debug, Clone, Default)]
pub struct ChargeRequestFilter {
    pub user_id: Option<i64>,
    pub status: Option<ChargeRequestStatus>,
    pub start_date: Option<NaiveDate>,
    /// Inclusive: requests made at any time on this day match.
    pub end_date: Option<NaiveDate>,
    pub depositor_name: Option<String>,
}

impl ChargeRequestFilter {
    /// Half-open `[from, until)` bounds on `request_date` derived from the date range.
    pub fn request_window(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let from = self.start_date.map(start_of_day);
        let until = self
            .end_date
            .map(|date| start_of_day(date) + Duration::days(1));
        (from, until)
    }

    pub fn matches(&self, request: &ChargeRequest) -> bool {
        if self.user_id.is_some_and(|user_id| user_id != request.user_id) {
            return false;
        }
        if self.status.is_some_and(|status| status != request.status) {
            return false;
        }
        if let Some(depositor) = &self.depositor_name {
            if depositor != &request.depositor_name {
                return false;
            }
        }
        let (from, until) = self.request_window();
        if from.is_some_and(|from| request.request_date < from) {
            return false;
        }
        if until.is_some_and(|until| request.request_date >= until) {
            return false;
        }
        true
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(chrono::NaiveTime::MIN), Utc)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Zero-based page number and page size, with the size clamped to `1..=max_size`.
    pub fn new(page: i64, size: i64, max_size: i64) -> Self {
        let limit = size.clamp(1, max_size.max(1));
        let offset = page.max(0).saturating_mul(limit);
        Self { offset, limit }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the whole filtered set.
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

/// Identity fields served by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub employee_number: i64,
    pub name: String,
    pub join_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequestDetail {
    #[serde(flatten)]
    pub request: ChargeRequest,
    pub user: Option<UserProfile>,
}
