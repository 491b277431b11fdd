mod api_error;
mod app_error;

pub use api_error::{ApiError, ApiOperation};
pub use app_error::{AppError, AppResult};
