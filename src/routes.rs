use axum::{
    routing::{get, post},
    Router,
};

use crate::mileage::api;

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/mileage", post(api::create_ledger))
        .route(
            "/api/mileage/:user_id",
            get(api::get_ledger).delete(api::delete_ledger),
        )
        .route("/api/mileage/consume", post(api::consume))
        .route("/api/mileage/refund", post(api::refund))
        .route(
            "/api/mileage/recharge-request",
            post(api::submit_charge_request),
        )
        .route(
            "/api/mileage/recharge-requests",
            get(api::list_charge_requests),
        )
        .route(
            "/api/mileage/recharge-requests/:request_id/process",
            post(api::process_charge_request),
        )
        .route(
            "/api/mileage/annual-mileage-charge",
            post(api::charge_annual_mileage),
        )
        .route(
            "/api/mileage/quarterly-mileage-charge",
            post(api::charge_quarterly_mileage),
        )
}
