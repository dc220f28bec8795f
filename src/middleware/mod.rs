pub mod auth;
pub mod errors;
pub mod json;
pub mod response;

pub use auth::{is_logged_in, protect, restrict_to, CurrentUser, MaybeUser};
pub use errors::expose_error_details;
pub use json::ApiJson;
pub use response::{ApiResponse, ApiResult};
