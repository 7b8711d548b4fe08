//! Credential envelope returned by GrantAccess
//!
//! The orchestrator hands this string to workloads verbatim, so the key names
//! and their order are part of the wire contract.

use std::fmt;

use serde::{Deserialize, Serialize};

use cosi_common::{Error, Result};

/// Everything a workload needs to reach its bucket
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEnvelope {
    /// Appliance S3 endpoint URL
    pub endpoint: String,
    /// Access key id of the granted principal
    pub access_key_id: String,
    /// Secret of the granted principal
    pub secret_key_id: String,
    /// Bucket the grant is for
    pub bucket: String,
}

impl CredentialEnvelope {
    /// Compact JSON with keys in declaration order
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::internal_with_context("envelope", e.to_string()))
    }

    /// Parse an envelope produced by [`CredentialEnvelope::to_json`]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::internal_with_context("envelope", e.to_string()))
    }
}

impl fmt::Debug for CredentialEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialEnvelope")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_key_id", &"<redacted>")
            .field("bucket", &self.bucket)
            .finish()
    }
}
