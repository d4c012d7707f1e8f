use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::error::MileageResult;

use super::accrual::AccrualReport;
use super::models::{
    ChargeRequest, ChargeRequestDetail, ChargeRequestFilter, ChargeRequestStatus, MileageLedger,
    Page, PageRequest, SortOption,
};
use super::service::MileageService;

const DEFAULT_PAGE_SIZE: i64 = 20;

/// Body shared by every successful response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub status: u16,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

type Reply<T> = MileageResult<(StatusCode, Json<SuccessResponse<T>>)>;

fn reply<T>(status: StatusCode, message: &'static str, data: Option<T>) -> Reply<T> {
    Ok((
        status,
        Json(SuccessResponse {
            status: status.as_u16(),
            message,
            data,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLedgerParams {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeMileageRequest {
    pub user_id: i64,
    pub amount: i64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundMileageRequest {
    pub user_id: i64,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequestSubmission {
    pub user_id: i64,
    pub amount: i64,
    pub depositor: String,
}

#[derive(Debug, Deserialize)]
pub struct ChargeRequestDecision {
    pub approve: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequestQuery {
    pub user_id: Option<i64>,
    pub status: Option<ChargeRequestStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub depositor_name: Option<String>,
    #[serde(default)]
    pub sort_option: SortOption,
    #[serde(default)]
    pub page: i64,
    pub size: Option<i64>,
}

impl ChargeRequestQuery {
    fn into_parts(self) -> (ChargeRequestFilter, SortOption, PageRequest) {
        let page = PageRequest::new(
            self.page,
            self.size.unwrap_or(DEFAULT_PAGE_SIZE),
            *config::MILEAGE_QUERY_MAX_PAGE_SIZE,
        );
        let filter = ChargeRequestFilter {
            user_id: self.user_id,
            status: self.status,
            start_date: self.start_date,
            end_date: self.end_date,
            depositor_name: self.depositor_name,
        };
        (filter, self.sort_option, page)
    }
}

/// key: mileage-api -> rest endpoints
pub async fn create_ledger(
    Extension(service): Extension<MileageService>,
    Query(params): Query<CreateLedgerParams>,
) -> Reply<MileageLedger> {
    let ledger = service.create_ledger(params.user_id).await?;
    reply(StatusCode::CREATED, "mileage ledger created", Some(ledger))
}

pub async fn get_ledger(
    Extension(service): Extension<MileageService>,
    Path(user_id): Path<i64>,
) -> Reply<MileageLedger> {
    let ledger = service.get_ledger(user_id).await?;
    reply(StatusCode::OK, "mileage ledger found", Some(ledger))
}

pub async fn delete_ledger(
    Extension(service): Extension<MileageService>,
    Path(user_id): Path<i64>,
) -> Reply<()> {
    service.delete_ledger(user_id).await?;
    reply(StatusCode::OK, "mileage ledger deleted", None)
}

pub async fn consume(
    Extension(service): Extension<MileageService>,
    Json(payload): Json<ConsumeMileageRequest>,
) -> Reply<MileageLedger> {
    let ledger = service
        .consume(payload.user_id, payload.amount, payload.reason.as_deref())
        .await?;
    reply(StatusCode::OK, "mileage consumed", Some(ledger))
}

pub async fn refund(
    Extension(service): Extension<MileageService>,
    Json(payload): Json<RefundMileageRequest>,
) -> Reply<MileageLedger> {
    let ledger = service.refund(payload.user_id, payload.amount).await?;
    reply(StatusCode::OK, "mileage refunded", Some(ledger))
}

pub async fn submit_charge_request(
    Extension(service): Extension<MileageService>,
    Json(payload): Json<ChargeRequestSubmission>,
) -> Reply<ChargeRequest> {
    let request = service
        .submit_charge_request(payload.user_id, payload.amount, &payload.depositor)
        .await?;
    reply(StatusCode::CREATED, "charge request submitted", Some(request))
}

pub async fn list_charge_requests(
    Extension(service): Extension<MileageService>,
    Query(query): Query<ChargeRequestQuery>,
) -> Reply<Page<ChargeRequestDetail>> {
    let (filter, sort, page) = query.into_parts();
    let page = service
        .query_charge_request_details(&filter, sort, page)
        .await?;
    reply(StatusCode::OK, "charge requests found", Some(page))
}

pub async fn process_charge_request(
    Extension(service): Extension<MileageService>,
    Path(request_id): Path<i64>,
    Json(decision): Json<ChargeRequestDecision>,
) -> Reply<ChargeRequest> {
    let request = service
        .process_charge_request(request_id, decision.approve)
        .await?;
    reply(StatusCode::OK, "charge request processed", Some(request))
}

pub async fn charge_annual_mileage(
    Extension(service): Extension<MileageService>,
) -> Reply<AccrualReport> {
    let report = service.charge_annual_mileage().await?;
    reply(StatusCode::OK, "annual mileage charged", Some(report))
}

pub async fn charge_quarterly_mileage(
    Extension(service): Extension<MileageService>,
) -> Reply<AccrualReport> {
    let report = service.charge_quarterly_mileage_based_on_tenure().await?;
    reply(StatusCode::OK, "tenure mileage charged", Some(report))
}
