//! Structured errors, serializable so callers can branch on the code

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The UI changed shape or the control is off-screen and unrecoverable.
    ControlNotFound,
    /// The control was found but refused the action.
    ActionFailed,
    NavigationFailed,
    /// A mutation was performed but the state never converged.
    VerificationTimeout,
    NotAuthorized,
    /// The requested value is outside what the control can represent.
    Unsupported,
    StaleElement,
    InvalidAttribute,
    InvalidValue,
    ValueUnavailable,
    AppNotRunning,
    LaunchFailed,
    SelectorInvalid,
    MultipleMatches,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    pub fn control_not_found(what: &str) -> Self {
        Self::new(ErrorCode::ControlNotFound, format!("No control matching: {}", what))
    }

    pub fn action_failed(action: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::ActionFailed,
            format!("{} failed: {}", action, reason),
        )
    }

    pub fn navigation_failed(destination: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::NavigationFailed,
            format!("Could not navigate to {}: {}", destination, reason),
        )
    }

    pub fn verification_timeout(what: &str, timeout_ms: u64) -> Self {
        Self::new(
            ErrorCode::VerificationTimeout,
            format!("Could not verify {} within {}ms", what, timeout_ms),
        )
    }

    pub fn not_authorized() -> Self {
        Self::new(
            ErrorCode::NotAuthorized,
            "Accessibility permission is required",
        )
        .with_suggestions(vec![
            "Enable this process in System Settings > Privacy & Security > Accessibility"
                .to_string(),
            "Run `axs permissions --request` to show the system prompt".to_string(),
        ])
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unsupported, message)
    }

    pub fn stale_element(what: &str) -> Self {
        Self::new(
            ErrorCode::StaleElement,
            format!("Element is no longer valid: {}", what),
        )
    }

    pub fn invalid_attribute(attribute: &str, role: &str) -> Self {
        Self::new(
            ErrorCode::InvalidAttribute,
            format!("Attribute {} is not meaningful for role {}", attribute, role),
        )
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidValue, message)
    }

    pub fn value_unavailable(what: &str) -> Self {
        Self::new(
            ErrorCode::ValueUnavailable,
            format!("No readable value for {}", what),
        )
    }

    pub fn app_not_running(app: &str) -> Self {
        Self::new(ErrorCode::AppNotRunning, format!("App not running: {}", app))
    }

    pub fn launch_failed(app: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::LaunchFailed,
            format!("Failed to launch {}: {}", app, reason),
        )
    }

    pub fn selector_invalid(selector: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::SelectorInvalid,
            format!("Invalid selector '{}': {}", selector, reason),
        )
    }

    pub fn multiple_matches(selector: &str, count: usize) -> Self {
        Self::new(
            ErrorCode::MultipleMatches,
            format!("Selector '{}' matched {} elements, expected 1", selector, count),
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        // Keep structured errors that were wrapped in anyhow along the way.
        match e.downcast::<Error>() {
            Ok(inner) => inner,
            Err(e) => Self::new(ErrorCode::Unknown, format!("{:#}", e)),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}
