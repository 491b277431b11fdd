pub mod http_executor;
pub mod models;
pub mod retry_policy;

pub use http_executor::HttpJobExecutor;
pub use retry_policy::RetryPolicy;
