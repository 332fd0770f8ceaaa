//! Shared utilities: timestamps, logging init, error-handling helpers,
//! and validation helpers.

pub mod error;
pub mod logging;
pub mod time;
pub mod validation;

pub use error::{log_error, log_error_async, result_to_option, with_default, with_default_async, with_fallback, with_fallback_async};
pub use logging::init_logging;
pub use time::{current_timestamp, current_timestamp_duration};
pub use validation::{ensure, ensure_fmt, ensure_not_empty, ensure_range, ensure_some};
