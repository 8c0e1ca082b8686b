pub mod error_message;
pub mod result;

pub use error_message::{describe_error, fallback_message};
pub use result::ApiResult;
