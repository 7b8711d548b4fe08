//! Error types for the COSI provisioner
//!
//! Every outbound call to the appliance lands in [`Error::Appliance`] with an
//! [`ErrorKind`] picked by [`classify`]. The RPC layer decides the status code
//! from the kind and the verb; the appliance's own message only reaches logs.

use std::fmt;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Categories of appliance failures
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Resource-exists signal (bucket or user collision)
    AlreadyExists,

    /// Target absent
    NotFound,

    /// Auth or permission rejection from the appliance
    Unauthorized,

    /// Network error, 5xx, throttling, timeout
    Transient,

    /// Malformed arguments
    Invalid,

    /// Everything else
    Internal,
}

impl ErrorKind {
    /// Whether a retry could succeed without anything changing
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Rank used when several failures must collapse into one.
    ///
    /// Higher is worse. NotFound and AlreadyExists rank lowest since cleanup
    /// paths already treat them as the desired state.
    pub fn severity(self) -> u8 {
        match self {
            Self::NotFound | Self::AlreadyExists => 0,
            Self::Invalid => 1,
            Self::Transient => 2,
            Self::Internal => 3,
            Self::Unauthorized => 4,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyExists => "already-exists",
            Self::NotFound => "not-found",
            Self::Unauthorized => "unauthorized",
            Self::Transient => "transient",
            Self::Invalid => "invalid",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for provisioner operations
#[derive(Debug, Error)]
pub enum Error {
    /// Failure reported by (or while talking to) the appliance
    #[error("appliance error [{operation}] ({kind}): {message}")]
    Appliance {
        /// Remote operation that failed (e.g. "CreateUser")
        operation: String,
        /// Classified failure category
        kind: ErrorKind,
        /// SDK error code, when the appliance returned one
        code: Option<String>,
        /// Appliance or transport message; log-only
        message: String,
    },

    /// Caller supplied an argument the provisioner rejects
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid, safe to return to the caller
        message: String,
    },

    /// Startup configuration is unusable
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's wrong
        message: String,
    },

    /// The inbound request was canceled before the operation finished
    #[error("operation canceled [{operation}]")]
    Canceled {
        /// Step that was in flight or about to start
        operation: String,
        /// Whether the remote side applied the change, when it could be determined
        applied: Option<bool>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "envelope", "server")
        context: String,
    },
}

impl Error {
    /// Create an appliance error of the given kind
    pub fn appliance(operation: impl Into<String>, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self::Appliance {
            operation: operation.into(),
            kind,
            code: None,
            message: msg.into(),
        }
    }

    /// Create an appliance error carrying the SDK error code
    pub fn appliance_with_code(
        operation: impl Into<String>,
        kind: ErrorKind,
        code: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Appliance {
            operation: operation.into(),
            kind,
            code: Some(code.into()),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a cancellation error for an operation whose outcome is unknown
    pub fn canceled(operation: impl Into<String>) -> Self {
        Self::Canceled {
            operation: operation.into(),
            applied: None,
        }
    }

    /// Create a cancellation error recording whether the change landed
    pub fn canceled_with_outcome(operation: impl Into<String>, applied: Option<bool>) -> Self {
        Self::Canceled {
            operation: operation.into(),
            applied,
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Category of this error.
    ///
    /// Returns `None` for cancellation, which has its own status code and is
    /// never retried by the provisioner.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Appliance { kind, .. } => Some(*kind),
            Error::Validation { .. } | Error::Configuration { .. } => Some(ErrorKind::Invalid),
            Error::Internal { .. } => Some(ErrorKind::Internal),
            Error::Canceled { .. } => None,
        }
    }

    /// True when the appliance reported the target as absent
    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::NotFound)
    }

    /// True when the appliance reported the target as already present
    pub fn is_already_exists(&self) -> bool {
        self.kind() == Some(ErrorKind::AlreadyExists)
    }

    /// True for cancellation
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled { .. })
    }

    /// Check if this error is retryable
    ///
    /// Only transient appliance failures are; everything else needs a change
    /// in arguments, configuration or appliance state first.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_some_and(ErrorKind::is_retryable)
    }

    /// Remote operation name, for appliance errors
    pub fn operation(&self) -> Option<&str> {
        match self {
            Error::Appliance { operation, .. } | Error::Canceled { operation, .. } => {
                Some(operation)
            }
            _ => None,
        }
    }
}

/// Error codes with a fixed category, checked before anything else.
const CODE_TABLE: &[(&str, ErrorKind)] = &[
    ("EntityAlreadyExists", ErrorKind::AlreadyExists),
    ("BucketAlreadyExists", ErrorKind::AlreadyExists),
    ("BucketAlreadyOwnedByYou", ErrorKind::AlreadyExists),
    ("NoSuchEntity", ErrorKind::NotFound),
    ("NoSuchBucket", ErrorKind::NotFound),
    ("NotFound", ErrorKind::NotFound),
    ("NoSuchKey", ErrorKind::NotFound),
    ("AccessDenied", ErrorKind::Unauthorized),
    ("InvalidAccessKeyId", ErrorKind::Unauthorized),
    ("SignatureDoesNotMatch", ErrorKind::Unauthorized),
    ("InvalidClientTokenId", ErrorKind::Unauthorized),
    ("UnauthorizedOperation", ErrorKind::Unauthorized),
    ("ExpiredToken", ErrorKind::Unauthorized),
    ("Throttling", ErrorKind::Transient),
    ("ThrottlingException", ErrorKind::Transient),
    ("SlowDown", ErrorKind::Transient),
    ("RequestTimeout", ErrorKind::Transient),
    ("ServiceUnavailable", ErrorKind::Transient),
    ("InternalError", ErrorKind::Transient),
    ("ServiceFailure", ErrorKind::Transient),
    ("InvalidInput", ErrorKind::Invalid),
    ("InvalidParameterValue", ErrorKind::Invalid),
    ("ValidationError", ErrorKind::Invalid),
    ("InvalidBucketName", ErrorKind::Invalid),
    ("MalformedPolicyDocument", ErrorKind::Invalid),
    ("BucketNotEmpty", ErrorKind::Internal),
    ("DeleteConflict", ErrorKind::Internal),
];

/// Classify an appliance failure.
///
/// Order: SDK error code, then HTTP status, then message substring.
pub fn classify(code: Option<&str>, status: Option<u16>, message: &str) -> ErrorKind {
    if let Some(code) = code {
        if let Some((_, kind)) = CODE_TABLE.iter().find(|(c, _)| *c == code) {
            return *kind;
        }
    }

    if let Some(status) = status {
        match status {
            401 | 403 => return ErrorKind::Unauthorized,
            404 => return ErrorKind::NotFound,
            409 => return ErrorKind::AlreadyExists,
            408 | 429 => return ErrorKind::Transient,
            500..=599 => return ErrorKind::Transient,
            400..=499 => return ErrorKind::Invalid,
            _ => {}
        }
    }

    let message = message.to_ascii_lowercase();
    if message.contains("already exists") {
        ErrorKind::AlreadyExists
    } else if message.contains("not found") || message.contains("does not exist") {
        ErrorKind::NotFound
    } else if message.contains("access denied") || message.contains("forbidden") {
        ErrorKind::Unauthorized
    } else if ["timeout", "timed out", "connection", "throttl"]
        .iter()
        .any(|needle| message.contains(needle))
    {
        ErrorKind::Transient
    } else {
        ErrorKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Classifying Appliance Failures
    // ==========================================================================

    /// Story: a replayed CreateBucket hits a collision
    ///
    /// Both collision codes S3 can return collapse to AlreadyExists so the
    /// engine can answer ALREADY_EXISTS regardless of bucket ownership.
    #[test]
    fn story_bucket_collisions_collapse_to_already_exists() {
        assert_eq!(
            classify(Some("BucketAlreadyExists"), Some(409), ""),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            classify(Some("BucketAlreadyOwnedByYou"), Some(409), ""),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            classify(Some("EntityAlreadyExists"), Some(409), ""),
            ErrorKind::AlreadyExists
        );
    }

    /// Story: cleanup finds nothing to clean
    #[test]
    fn story_missing_resources_are_not_found() {
        assert_eq!(classify(Some("NoSuchEntity"), None, ""), ErrorKind::NotFound);
        assert_eq!(classify(Some("NoSuchBucket"), None, ""), ErrorKind::NotFound);
        assert_eq!(classify(None, Some(404), ""), ErrorKind::NotFound);
    }

    /// Story: the code wins over a contradicting status
    ///
    /// A non-empty bucket comes back as 409, which would otherwise read as a
    /// collision. The code table pins it to Internal.
    #[test]
    fn story_code_takes_precedence_over_status() {
        assert_eq!(
            classify(Some("BucketNotEmpty"), Some(409), "bucket not empty"),
            ErrorKind::Internal
        );
        assert_eq!(
            classify(Some("DeleteConflict"), Some(409), ""),
            ErrorKind::Internal
        );
        assert_eq!(
            classify(Some("SlowDown"), Some(503), "already exists"),
            ErrorKind::Transient
        );
    }

    /// Story: the appliance is unhealthy or overloaded
    #[test]
    fn story_server_side_trouble_is_transient() {
        assert_eq!(classify(None, Some(500), ""), ErrorKind::Transient);
        assert_eq!(classify(None, Some(503), ""), ErrorKind::Transient);
        assert_eq!(classify(None, Some(429), ""), ErrorKind::Transient);
        assert_eq!(classify(Some("Throttling"), Some(400), ""), ErrorKind::Transient);
    }

    /// Story: the provisioner's own credentials are rejected
    #[test]
    fn story_auth_rejections_are_unauthorized() {
        assert_eq!(classify(Some("AccessDenied"), None, ""), ErrorKind::Unauthorized);
        assert_eq!(classify(None, Some(403), ""), ErrorKind::Unauthorized);
        assert_eq!(classify(None, Some(401), ""), ErrorKind::Unauthorized);
    }

    #[test]
    fn unknown_4xx_is_invalid() {
        assert_eq!(classify(Some("SomethingOdd"), Some(400), ""), ErrorKind::Invalid);
        assert_eq!(classify(None, Some(422), ""), ErrorKind::Invalid);
    }

    #[test]
    fn message_is_consulted_last() {
        assert_eq!(
            classify(None, None, "User cosi-x Already Exists"),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            classify(None, None, "user does not exist"),
            ErrorKind::NotFound
        );
        assert_eq!(classify(None, None, "Access Denied"), ErrorKind::Unauthorized);
        assert_eq!(
            classify(None, None, "connection reset by peer"),
            ErrorKind::Transient
        );
        assert_eq!(classify(None, None, "request timed out"), ErrorKind::Transient);
        assert_eq!(classify(None, None, "something else"), ErrorKind::Internal);
    }

    #[test]
    fn kind_projection() {
        assert_eq!(
            Error::appliance("CreateUser", ErrorKind::Transient, "x").kind(),
            Some(ErrorKind::Transient)
        );
        assert_eq!(Error::validation("x").kind(), Some(ErrorKind::Invalid));
        assert_eq!(Error::configuration("x").kind(), Some(ErrorKind::Invalid));
        assert_eq!(Error::internal("x").kind(), Some(ErrorKind::Internal));
        assert_eq!(Error::canceled("CreateUser").kind(), None);
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(Error::appliance("op", ErrorKind::Transient, "x").is_retryable());
        assert!(!Error::appliance("op", ErrorKind::Internal, "x").is_retryable());
        assert!(!Error::appliance("op", ErrorKind::Unauthorized, "x").is_retryable());
        assert!(!Error::validation("x").is_retryable());
        assert!(!Error::canceled("op").is_retryable());
    }

    #[test]
    fn severity_orders_revoke_failures() {
        let mut kinds = vec![
            ErrorKind::Transient,
            ErrorKind::Unauthorized,
            ErrorKind::Invalid,
            ErrorKind::Internal,
        ];
        kinds.sort_by_key(|k| std::cmp::Reverse(k.severity()));
        assert_eq!(
            kinds,
            vec![
                ErrorKind::Unauthorized,
                ErrorKind::Internal,
                ErrorKind::Transient,
                ErrorKind::Invalid,
            ]
        );
        assert_eq!(ErrorKind::NotFound.severity(), 0);
    }

    #[test]
    fn display_includes_operation_and_kind() {
        let err = Error::appliance_with_code(
            "AttachUserPolicy",
            ErrorKind::NotFound,
            "NoSuchEntity",
            "policy missing",
        );
        let text = err.to_string();
        assert!(text.contains("[AttachUserPolicy]"));
        assert!(text.contains("not-found"));
        assert!(text.contains("policy missing"));
        assert_eq!(err.operation(), Some("AttachUserPolicy"));
    }

    #[test]
    fn canceled_records_outcome() {
        match Error::canceled_with_outcome("CreateBucket", Some(true)) {
            Error::Canceled { operation, applied } => {
                assert_eq!(operation, "CreateBucket");
                assert_eq!(applied, Some(true));
            }
            _ => panic!("Expected Canceled variant"),
        }
        assert!(Error::canceled("x").is_canceled());
    }

    #[test]
    fn internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert!(err.to_string().contains("[unknown]"));
        let err = Error::internal_with_context("envelope", "encode failed");
        assert!(err.to_string().contains("[envelope]"));
    }
}
