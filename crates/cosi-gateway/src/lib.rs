//! Appliance gateways for the ObjectScale COSI provisioner
//!
//! Two narrow traits front the appliance: [`IamGateway`] for principals,
//! policies and keys, and [`S3Gateway`] for buckets. [`IamClient`] and
//! [`S3Client`] implement them with the AWS SDK; enable the `mock` feature
//! for the generated `MockIamGateway` and `MockS3Gateway`.

#![deny(missing_docs)]

pub mod config;
pub mod iam;
pub mod s3;
pub mod translate;
pub mod types;

pub use config::ApplianceConfig;
pub use iam::{IamClient, IamGateway};
pub use s3::{S3Client, S3Gateway};
pub use types::{AccessKeyPair, IamUser};

#[cfg(any(test, feature = "mock"))]
pub use iam::MockIamGateway;
#[cfg(any(test, feature = "mock"))]
pub use s3::MockS3Gateway;
