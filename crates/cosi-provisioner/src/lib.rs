//! ObjectScale COSI provisioner
//!
//! Implements the COSI provisioner gRPC contract against an ObjectScale
//! appliance: buckets through its S3 endpoint, per-workload principals and
//! access keys through its IAM endpoint.
//!
//! - [`engine`]: the four verbs, compensation and revocation
//! - [`server`]: tonic services and the listener
//! - [`config`]: command-line and environment configuration

#![deny(missing_docs)]

pub mod config;
pub mod engine;
pub mod envelope;
pub mod principal;
pub mod server;
pub mod status;

pub use config::{Cli, ListenAddr};
pub use engine::{EngineSettings, Grant, ProvisioningEngine};
pub use envelope::CredentialEnvelope;
