pub mod config;
pub mod error;
pub mod mileage;
pub mod routes;

pub use error::{MileageError, MileageResult};
pub use mileage::MileageService;
pub use routes::api_routes;
