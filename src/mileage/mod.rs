pub mod accrual;
pub mod api;
pub mod directory;
pub mod ledger;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod transition;

pub use accrual::AccrualReport;
pub use directory::{HttpUserDirectory, UserDirectory};
pub use ledger::{tenure_years, ANNUAL_MILEAGE, TENURE_MILEAGE_PER_YEAR};
pub use memory::MemoryMileageStore;
pub use models::{
    ChargeRequest, ChargeRequestDetail, ChargeRequestFilter, ChargeRequestStatus, MileageLedger,
    NewChargeRequest, Page, PageRequest, SortOption, UserProfile,
};
pub use postgres::PgMileageStore;
pub use scheduler::{
    process_tick as run_accrual_tick, spawn as spawn_accrual_scheduler, AccrualSchedule,
    TickOutcome,
};
pub use service::MileageService;
pub use store::{ChargeMutation, ChargeRequestStore, LedgerMutation, LedgerStore};
pub use transition::{BalanceEffect, Transition};
