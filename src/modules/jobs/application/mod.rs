pub mod dto;
pub mod service;

pub use dto::{DashboardOverview, JobView};
pub use service::BulkOperationService;
