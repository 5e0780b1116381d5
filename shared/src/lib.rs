#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod api;
pub mod app;
pub mod capabilities;
pub mod config;
pub mod eligibility;
pub mod event;
pub mod history;
pub mod model;
pub mod refresh;
pub mod runtime;
pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub use app::{App, Effect};
pub use capabilities::Capabilities;
pub use config::Config;
pub use event::Event;
pub use model::Model;
pub use runtime::Core;
pub use view::ViewModel;

/// Length of the edit window that opens when a report is recorded.
pub const EDIT_WINDOW_MINUTES: i64 = 10;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
pub const MUTATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_API_BASE_URL: &str = "https://safe-city-1acefa1f4310.herokuapp.com";
pub const PROFILE_CACHE_KEY: &str = "userData";
pub const MAX_DESCRIPTION_LENGTH: usize = 4096;
pub const MAX_LOCATION_LENGTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Rejected,
    EditWindowClosed,
    Storage,
    Serialization,
    Deserialization,
    Configuration,
    InvalidState,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Authentication => "AUTH_ERROR",
            Self::Authorization => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Rejected => "REJECTED",
            Self::EditWindowClosed => "EDIT_WINDOW_CLOSED",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::Deserialization => "DESERIALIZATION_ERROR",
            Self::Configuration => "CONFIG_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Timeout | Self::Storage => ErrorSeverity::Transient,

            Self::Serialization | Self::Configuration | Self::Internal | Self::InvalidState => {
                ErrorSeverity::Fatal
            }

            Self::Authentication
            | Self::Authorization
            | Self::Validation
            | Self::NotFound
            | Self::Rejected
            | Self::EditWindowClosed
            | Self::Deserialization
            | Self::Unknown => ErrorSeverity::Permanent,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::Storage)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::Authentication => {
                "Your email or password is incorrect. Please try again.".into()
            }
            ErrorKind::Authorization => {
                "You don't have permission to perform this action.".into()
            }
            ErrorKind::Validation | ErrorKind::Rejected => self.message.clone(),
            ErrorKind::NotFound => "The requested report could not be found.".into(),
            ErrorKind::EditWindowClosed => format!(
                "Reports can only be edited once, within {EDIT_WINDOW_MINUTES} minutes of being filed."
            ),
            ErrorKind::Storage => "Unable to save data on this device.".into(),
            ErrorKind::Serialization | ErrorKind::Deserialization => {
                "The server sent data we could not read. Please try again later.".into()
            }
            ErrorKind::Configuration => {
                "The app is misconfigured. Please reinstall or contact support.".into()
            }
            ErrorKind::InvalidState => {
                "The app is in an invalid state. Please restart the app.".into()
            }
            ErrorKind::Internal | ErrorKind::Unknown => {
                "An unexpected error occurred. Please try again or contact support.".into()
            }
        }
    }

    /// Maps a non-2xx status, using the backend's `message` when the body carries one.
    #[must_use]
    pub fn from_http_status(status: u16, body: Option<&[u8]>) -> Self {
        let kind = match status {
            400 | 422 => ErrorKind::Validation,
            401 => ErrorKind::Authentication,
            403 => ErrorKind::Authorization,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            500..=599 => ErrorKind::Internal,
            _ => ErrorKind::Unknown,
        };

        let message = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .and_then(|e| e.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        Self::new(kind, message).with_context("http_status", status.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<capabilities::HttpError> for AppError {
    fn from(e: capabilities::HttpError) -> Self {
        use capabilities::HttpError;
        match &e {
            HttpError::Timeout { .. } => {
                AppError::new(ErrorKind::Timeout, "Request timed out").with_internal(e.to_string())
            }
            HttpError::ConnectionError { .. } => {
                AppError::new(ErrorKind::Network, "Network error").with_internal(e.to_string())
            }
            HttpError::HttpStatus {
                status, message, ..
            } => AppError::from_http_status(*status, Some(message.as_bytes())),
            HttpError::InvalidResponse { .. } | HttpError::ResponseTooLarge { .. } => {
                AppError::new(ErrorKind::Deserialization, "Invalid server response")
                    .with_internal(e.to_string())
            }
            HttpError::InvalidUrl { .. } => {
                AppError::new(ErrorKind::Configuration, "Invalid server address")
                    .with_internal(e.to_string())
            }
            HttpError::SerializationError { .. } | HttpError::BodyTooLarge { .. } => {
                AppError::new(ErrorKind::Serialization, "Request could not be encoded")
                    .with_internal(e.to_string())
            }
            HttpError::InvalidHeader { .. }
            | HttpError::TooManyHeaders { .. }
            | HttpError::InvalidRequest { .. } => {
                AppError::new(ErrorKind::Internal, "Request failed").with_internal(e.to_string())
            }
        }
    }
}

impl From<capabilities::KvError> for AppError {
    fn from(e: capabilities::KvError) -> Self {
        use capabilities::KvError;
        let kind = match &e {
            KvError::Serialization { .. } => ErrorKind::Deserialization,
            KvError::InvalidKey { .. } => ErrorKind::Configuration,
            KvError::ValueTooLarge { .. } | KvError::Storage { .. } => ErrorKind::Storage,
        };
        AppError::new(kind, "Local storage error").with_internal(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Client-side validation failures for report edits and submissions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },
    #[error("{field} exceeds maximum length of {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} has an invalid format: {value}")]
    InvalidFormat { field: &'static str, value: String },
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        let field = match &e {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::InvalidFormat { field, .. } => *field,
        };
        AppError::new(ErrorKind::Validation, e.to_string()).with_context("field", field)
    }
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Backend-assigned report identifier.
    ReportId
);
numeric_id!(CitizenId);
numeric_id!(OfficerId);
numeric_id!(AdminId);
