//! # Error Handling
//!
//! This module defines the error types for the live-call pipeline and how
//! they stay local to the operation that failed.
//! This is a great example of Rust's powerful error handling system.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - **Purpose**: Forces you to handle both success and failure cases
//! - **T**: The success type (what you get when everything works)
//! - **E**: The error type (what you get when something goes wrong)
//! - **No exceptions**: Rust doesn't have try/catch, it uses Result instead
//!
//! ### Enums for Error Types
//! - **Variants**: Each enum variant represents a different kind of error
//! - **Data**: Each variant can hold additional information (String, numbers, etc.)
//! - **Pattern matching**: Use `match` to handle different error types
//!
//! ### Traits for Error Conversion
//! - **From trait**: Automatically converts between error types
//! - **Display trait**: Defines how errors are formatted as strings
//!
//! ## Why custom errors:
//! Every failure class in this pipeline is recoverable locally: a capture
//! error leaves the microphone stopped, a transport error tears down the
//! dependent capture, a decode error drops one message, a validation error
//! degrades one rendering. The enum makes each class explicit so callers
//! can degrade exactly the right amount instead of crashing the call.

use std::fmt;  // For implementing Display trait

/// Custom error types for the application.
///
/// ## Rust Concepts:
/// - **enum**: A type that can be one of several variants
/// - **String**: Each variant holds an error message
/// - **#[derive(Debug)]**: Automatically implements debug printing
///
/// ## Error Categories:
/// - **Capture**: Microphone/device failure; capture stays stopped, nothing partially starts
/// - **Transport**: Socket failure or unexpected close; forces capture teardown
/// - **Decode**: Malformed inbound payload; the single offending message is dropped
/// - **Validation**: Data failed a consistency rule; that one operation degrades
/// - **Config**: Configuration file or environment variable problems at startup
/// - **Internal**: Anything unexpected that doesn't fit the pipeline taxonomy
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::Capture("no input device available".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Microphone acquisition or stream failure (permission denied, device busy)
    Capture(String),

    /// Socket-level failure: handshake, send, or unexpected close
    Transport(String),

    /// Inbound payload could not be parsed into a known wire shape
    Decode(String),

    /// Data failed validation rules (bounds, ranges, required fields)
    Validation(String),

    /// Configuration file or environment variable problems
    Config(String),

    /// Unexpected internal errors (channel breakage, task failures)
    Internal(String),
}

/// Implementation of the Display trait for AppError.
///
/// ## Purpose:
/// This trait defines how errors are formatted as human-readable strings.
/// It's used when you print an error or convert it to a string.
///
/// ## Rust Concepts:
/// - **impl Trait for Type**: Implementing a trait for our custom type
/// - **match**: Pattern matching to handle each error variant
/// - **write!**: Macro for formatting strings (like printf in C)
/// - **&self**: Immutable reference to the error
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(msg) => write!(f, "Capture error: {}", msg),
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::Decode(msg) => write!(f, "Decode error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Marks AppError as a standard error type.
///
/// ## Purpose:
/// Implementing std::error::Error lets AppError compose with anything that
/// works over `Box<dyn Error>` or anyhow at the binary boundary. Display and
/// Debug already provide the required formatting, so the impl body is empty.
impl std::error::Error for AppError {}

/// Automatic conversion from anyhow::Error to AppError.
///
/// ## Purpose:
/// The anyhow crate provides general-purpose error handling at the entry
/// point. This conversion allows anyhow errors from setup code to flow into
/// the pipeline's error type when needed.
///
/// ## Rust Concepts:
/// - **From trait**: Enables automatic conversion with `.into()` or `?`
/// - **Self**: Refers to AppError (the type we're implementing for)
/// - **.to_string()**: Converts the error to a string representation
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Automatic conversion from JSON parsing errors to AppError.
///
/// ## Purpose:
/// When parsing an inbound analysis message fails, the failure belongs to
/// the decode class: the one message is dropped and logged, the session and
/// the aggregation state stay untouched.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(format!("JSON parsing error: {}", err))
    }
}

/// Automatic conversion from configuration errors to AppError.
///
/// ## Purpose:
/// Configuration loading can fail for various reasons (missing files, invalid
/// syntax, bad environment overrides). These surface once, at startup.
///
/// ## When this happens:
/// - config.toml file has invalid syntax
/// - An environment override has the wrong type
/// - Configuration values fail validation
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
///
/// ## Purpose:
/// This creates a shorthand for `Result<T, AppError>` so you can write
/// `AppResult<String>` instead of `Result<String, AppError>`.
///
/// ## Usage Example:
/// ```rust
/// fn load_config() -> AppResult<AppConfig> {
///     // This is equivalent to: fn load_config() -> Result<AppConfig, AppError>
///     AppConfig::load()
/// }
/// ```
///
/// ## Rust Concepts:
/// - **type alias**: Creates a new name for an existing type
/// - **Generic type**: `T` can be any type (String, AppConfig, etc.)
pub type AppResult<T> = Result<T, AppError>;
