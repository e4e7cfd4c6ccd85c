//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **struct**: Custom data types that group related fields together
//! - **impl blocks**: Add methods to structs
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_ENDPOINT_HOST, APP_ENDPOINT_SCHEME, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The analysis endpoint is the only setting the hosting environment is
//! expected to override; everything else ships with working defaults. Audio
//! format parameters (16 kHz, 4096-sample blocks) are protocol constants in
//! the audio module, not configuration.

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables

/// Main application configuration that contains all settings.
///
/// ## Rust Concepts:
/// - **#[derive(...)]**: Automatically implements common traits:
///   - `Debug`: Allows printing with {:?} for debugging
///   - `Clone`: Allows making copies of the struct
///   - `Serialize`: Can convert this struct to JSON, TOML, etc.
///   - `Deserialize`: Can create this struct from JSON, TOML, etc.
/// - **pub struct**: Public struct that other modules can use
/// - **pub fields**: Public fields that can be accessed directly
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (endpoint, session) makes it
/// easier to understand and maintain as the application grows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub endpoint: EndpointConfig,
    pub session: SessionConfig,
}

/// Analysis service endpoint settings.
///
/// ## Fields:
/// - `scheme`: WebSocket scheme, `ws` for plain or `wss` when the hosting
///   environment terminates TLS
/// - `host`: host (and optional port) of the analysis service (e.g., "127.0.0.1:8001")
/// - `path`: WebSocket route on the service, normally "/ws/audio"
///
/// ## Common values:
/// - `scheme = "ws"`, `host = "127.0.0.1:8001"`: local development
/// - `scheme = "wss"`, `host = "analysis.internal.example"`: deployed behind TLS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub scheme: String,
    pub host: String,
    pub path: String,
}

/// Call-session tuning.
///
/// ## Fields:
/// - `connect_timeout_ms`: how long the session owner waits for the socket to
///   reach Open before treating the call start as failed
/// - `connect_poll_interval_ms`: how often the owner re-checks the connection
///   state while waiting (the transport itself has no built-in timeout)
/// - `send_window_frames`: in-flight audio frames allowed between the capture
///   callback and the socket writer; frames beyond the window are dropped,
///   never queued
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub connect_timeout_ms: u64,
    pub connect_poll_interval_ms: u64,
    pub send_window_frames: usize,  // usize = platform-specific unsigned integer (usually 64-bit)
}

/// Provides default configuration values.
///
/// ## Rust Concepts:
/// - **impl Default**: Implements the Default trait, which provides a `default()` method
/// - **Self**: Refers to the current type (AppConfig)
/// - **to_string()**: Converts string literals (&str) to owned String objects
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig {
                scheme: "ws".to_string(),            // Plain WebSocket (local development)
                host: "127.0.0.1:8001".to_string(),  // Analysis service default port
                path: "/ws/audio".to_string(),       // Streaming route on the service
            },
            session: SessionConfig {
                connect_timeout_ms: 5000,        // Five seconds to reach Open
                connect_poll_interval_ms: 100,   // Re-check connection state at 10 Hz
                send_window_frames: 8,           // ~2s of audio in flight at most
            },
        }
    }
}

/// Implementation block for AppConfig - adds methods to the struct.
impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and SCHEME environment variables
    ///
    /// ## Rust Concepts:
    /// - **Builder pattern**: Chain method calls to configure the config loader
    /// - **?**: Early return on error (if any step fails, return the error)
    /// - **env::var()**: Read environment variables, returns Result<String, VarError>
    /// - **if let Ok(...)**: Only execute if the environment variable exists
    ///
    /// ## Environment Variable Examples:
    /// - `APP_ENDPOINT_HOST=172.16.1.76:8001`: Override the analysis host
    /// - `APP_ENDPOINT_SCHEME=wss`: Override the socket scheme
    /// - `APP_SESSION_CONNECT_TIMEOUT_MS=10000`: Override the connect wait
    /// - `HOST=172.16.1.76:8001`: Special case for deployment platforms
    /// - `SCHEME=wss`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists) - required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            // Example: APP_ENDPOINT_HOST becomes endpoint.host in the config
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Handle special environment variables used by deployment platforms
        // These don't follow the APP_ prefix convention but are commonly used
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("endpoint.host", host)?;
        }

        if let Ok(scheme) = env::var("SCHEME") {
            settings = settings.set_override("endpoint.scheme", scheme)?;
        }

        // Build the final configuration and convert it back to our AppConfig struct
        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Scheme is one of the two WebSocket schemes (ws, wss)
    /// - Host is not empty (there is no sensible fallback service)
    /// - Path starts with "/" (it is joined directly onto the host)
    /// - Connect timeout and poll interval are non-zero, and polling is at
    ///   least as frequent as the timeout it is meant to enforce
    /// - Send window allows at least one in-flight frame
    ///
    /// ## Rust Concepts:
    /// - **&self**: Borrowed reference (read-only access to the struct)
    /// - **anyhow::anyhow!**: Creates an error with a custom message
    /// - **Early return**: Return immediately if validation fails
    ///
    /// ## Why validate:
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.scheme != "ws" && self.endpoint.scheme != "wss" {
            return Err(anyhow::anyhow!(
                "Endpoint scheme must be 'ws' or 'wss', got '{}'",
                self.endpoint.scheme
            ));
        }

        if self.endpoint.host.is_empty() {
            return Err(anyhow::anyhow!("Endpoint host cannot be empty"));
        }

        if !self.endpoint.path.starts_with('/') {
            return Err(anyhow::anyhow!("Endpoint path must start with '/'"));
        }

        if self.session.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("Connect timeout must be greater than 0"));
        }

        if self.session.connect_poll_interval_ms == 0
            || self.session.connect_poll_interval_ms > self.session.connect_timeout_ms
        {
            return Err(anyhow::anyhow!(
                "Connect poll interval must be between 1 and the connect timeout"
            ));
        }

        if self.session.send_window_frames == 0 {
            return Err(anyhow::anyhow!("Send window must allow at least one frame"));
        }

        Ok(())  // All validation passed
    }

    /// Build the full WebSocket URL for the analysis endpoint.
    ///
    /// ## What this does:
    /// Joins scheme, host, and path into the dial string handed to the
    /// session transport, e.g. `ws://127.0.0.1:8001/ws/audio`.
    pub fn ws_url(&self) -> String {
        format!(
            "{}://{}{}",
            self.endpoint.scheme, self.endpoint.host, self.endpoint.path
        )
    }
}

/// Tests for the configuration module.
///
/// ## Rust Concepts:
/// - **#[cfg(test)]**: Only compile this code when running tests
/// - **mod tests**: A module containing test functions
/// - **#[test]**: Marks a function as a test case
/// - **assert_eq!**: Checks that two values are equal
/// - **assert!**: Checks that a condition is true
/// - **is_ok(), is_err()**: Check if a Result is success or error
///
/// ## Testing philosophy:
/// Tests ensure that the configuration system works correctly and
/// catches errors before they reach production.
#[cfg(test)]
mod tests {
    use super::*;  // Import everything from the parent module

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.endpoint.scheme, "ws");
        assert_eq!(config.endpoint.host, "127.0.0.1:8001");
        assert_eq!(config.endpoint.path, "/ws/audio");
        // Ensure the default config passes validation
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.endpoint.scheme = "http".to_string();  // Not a WebSocket scheme
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.endpoint.host = String::new();  // Empty host
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.endpoint.path = "ws/audio".to_string();  // Missing leading slash
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.connect_poll_interval_ms = config.session.connect_timeout_ms + 1;
        assert!(config.validate().is_err());
    }

    /// Test that the dial URL is assembled from the endpoint parts.
    #[test]
    fn test_ws_url() {
        let mut config = AppConfig::default();
        assert_eq!(config.ws_url(), "ws://127.0.0.1:8001/ws/audio");

        config.endpoint.scheme = "wss".to_string();
        config.endpoint.host = "analysis.example.com".to_string();
        assert_eq!(config.ws_url(), "wss://analysis.example.com/ws/audio");
    }
}
