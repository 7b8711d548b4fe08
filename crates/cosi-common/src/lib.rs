//! Common types for the COSI provisioner: errors, retry and telemetry

#![deny(missing_docs)]

pub mod error;
pub mod retry;
pub mod telemetry;

pub use error::{classify, Error, ErrorKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Prefix of every principal the provisioner creates
pub const PRINCIPAL_PREFIX: &str = "cosi-";

/// Region applied when neither the caller nor the configuration supplies one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Site-wide S3 full-access policy on ObjectScale
pub const S3_FULL_ACCESS_POLICY_ARN: &str = "urn:osc:iam:::policy/OSCS3FullAccess";

/// Header ObjectScale uses to route IAM calls to an account namespace
pub const NAMESPACE_HEADER: &str = "x-emc-namespace";

/// Default listen address for the COSI sidecar socket
pub const DEFAULT_COSI_ENDPOINT: &str = "unix:///var/lib/cosi/cosi.sock";

/// Name reported by the Identity service unless configured otherwise
pub const DEFAULT_PROVISIONER_NAME: &str = "objectscale.cosi.dell.com";

/// Seconds compensation may keep running after the request is canceled
pub const DEFAULT_COMPENSATION_GRACE_SECS: u64 = 5;
