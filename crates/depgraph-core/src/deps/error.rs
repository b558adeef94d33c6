//! Dependency resolution error types.

use std::fmt;

/// Dependency resolution error codes.
pub mod codes {
    pub const DEPS_REQUEST_INVALID: &str = "DEPS_REQUEST_INVALID";
    pub const DEPS_CONSTRAINT_INVALID: &str = "DEPS_CONSTRAINT_INVALID";
    pub const DEPS_NO_COMPATIBLE_VERSION: &str = "DEPS_NO_COMPATIBLE_VERSION";
    pub const DEPS_PACKAGE_NOT_FOUND: &str = "DEPS_PACKAGE_NOT_FOUND";
    pub const DEPS_REGISTRY_UNAVAILABLE: &str = "DEPS_REGISTRY_UNAVAILABLE";
    pub const DEPS_MANIFEST_UNAVAILABLE: &str = "DEPS_MANIFEST_UNAVAILABLE";
    pub const DEPS_REGISTRY_TIMEOUT: &str = "DEPS_REGISTRY_TIMEOUT";
    pub const DEPS_SERIALIZE_FAILED: &str = "DEPS_SERIALIZE_FAILED";

    /// Codes for failures that may not happen again on a retry.
    #[must_use]
    pub fn is_transient(code: &str) -> bool {
        matches!(
            code,
            DEPS_REGISTRY_UNAVAILABLE | DEPS_MANIFEST_UNAVAILABLE | DEPS_REGISTRY_TIMEOUT
        )
    }
}

/// Dependency resolution error.
///
/// Cloneable so that a single failed fetch can be reported on every edge
/// that reaches the same package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepsError {
    code: &'static str,
    message: String,
}

impl DepsError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a request invalid error (missing name or constraint).
    pub fn request_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::DEPS_REQUEST_INVALID, msg)
    }

    /// Create a constraint invalid error.
    #[must_use]
    pub fn constraint_invalid(range: &str, reason: &str) -> Self {
        Self::new(
            codes::DEPS_CONSTRAINT_INVALID,
            format!("Invalid version range '{range}': {reason}"),
        )
    }

    /// Create a no compatible version error.
    #[must_use]
    pub fn no_compatible_version(name: &str, range: &str) -> Self {
        Self::new(
            codes::DEPS_NO_COMPATIBLE_VERSION,
            format!("No version of {name} satisfies range: {range}"),
        )
    }

    /// Create a package not found error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(codes::DEPS_PACKAGE_NOT_FOUND, format!("Package not found: {name}"))
    }

    /// Create a registry unavailable error.
    pub fn registry_unavailable(msg: impl Into<String>) -> Self {
        Self::new(codes::DEPS_REGISTRY_UNAVAILABLE, msg)
    }

    /// Create a manifest unavailable error.
    #[must_use]
    pub fn manifest_unavailable(name: &str, version: &str, reason: &str) -> Self {
        Self::new(
            codes::DEPS_MANIFEST_UNAVAILABLE,
            format!("Manifest for {name}@{version} unavailable: {reason}"),
        )
    }

    /// Create a registry timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(codes::DEPS_REGISTRY_TIMEOUT, msg)
    }

    /// Create a serialization failed error.
    pub fn serialize_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::DEPS_SERIALIZE_FAILED, msg)
    }

    /// Whether a retry could succeed (registry down, slow or erroring).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        codes::is_transient(self.code)
    }

    /// Whether this error is the caller's fault rather than ours.
    #[must_use]
    pub fn is_request_error(&self) -> bool {
        self.code == codes::DEPS_REQUEST_INVALID
    }
}

impl fmt::Display for DepsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for DepsError {}

impl From<reqwest::Error> for DepsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::registry_unavailable(format!("Connection failed: {e}"))
        } else {
            Self::registry_unavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for DepsError {
    fn from(e: serde_json::Error) -> Self {
        Self::registry_unavailable(format!("Invalid JSON: {e}"))
    }
}
