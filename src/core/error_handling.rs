//! Generic error handling utilities
//!
//! Distinguishes errors the user can act on (bad configuration) from system
//! errors, so the entry point can log each with the right amount of detail.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` should return
/// `Some(message)`; otherwise it should return `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the user can act on directly
    fn is_user_actionable(&self) -> bool;

    /// The message to show when the error is user-actionable
    fn user_message(&self) -> Option<String>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// User-actionable errors log their own message; system errors log the
/// operation context. Full detail always goes to debug level.
///
/// # Examples
/// ```rust,no_run
/// # use mayhem::core::error_handling::log_error_with_context;
/// # use mayhem::app::cli::config::ConfigError;
/// let err = ConfigError::InvalidValue {
///     field: "producers".to_string(),
///     message: "must be at least 1".to_string(),
/// };
/// log_error_with_context(&err, "Configuration loading");
/// // Logs: "FATAL: producers: must be at least 1"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

/// Message to print before logging is available
pub fn fatal_message<E: ContextualError>(error: &E, operation_context: &str) -> String {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => format!("FATAL: {user_msg}"),
        _ => format!("FATAL: {operation_context}: {error}"),
    }
}
