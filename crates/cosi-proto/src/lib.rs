//! Protocol buffer definitions for the COSI provisioner services.
//!
//! The orchestrator's COSI sidecar is the gRPC client; this process serves
//! two services over a unix socket (or TCP in tests):
//!
//! - `Identity`: [`ProvisionerGetInfoRequest`] returns the provisioner name
//! - `Provisioner`: the four bucket and access verbs
//!
//! ```text
//! ┌──────────────────────┐   CreateBucket / DeleteBucket    ┌───────────────┐
//! │  COSI sidecar        │ ───────────────────────────────► │  provisioner  │
//! │  (orchestrator side) │   GrantAccess / RevokeAccess     │  (this repo)  │
//! └──────────────────────┘                                  └───────┬───────┘
//!                                                                   │ S3 + IAM
//!                                                                   ▼
//!                                                           ┌───────────────┐
//!                                                           │  ObjectScale  │
//!                                                           └───────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cosi_proto::provisioner_client::ProvisionerClient;
//! use cosi_proto::ProvisionerCreateBucketRequest;
//!
//! let mut client = ProvisionerClient::connect("http://127.0.0.1:9000").await?;
//! let response = client
//!     .provisioner_create_bucket(ProvisionerCreateBucketRequest {
//!         name: "b1".to_string(),
//!         ..Default::default()
//!     })
//!     .await?;
//! assert_eq!(response.into_inner().bucket_id, "b1");
//! ```

// Generated protobuf code doesn't have docs
#![allow(missing_docs)]

/// Generated protobuf types from cosi.proto
pub mod cosi {
    /// Version v1alpha1 of the provisioner protocol
    pub mod v1alpha1 {
        tonic::include_proto!("cosi.v1alpha1");
    }
}

pub use cosi::v1alpha1::*;

/// Region carried by an S3 protocol, if the caller set a non-empty one.
pub fn s3_region(protocol: Option<&Protocol>) -> Option<&str> {
    match protocol.and_then(|p| p.r#type.as_ref()) {
        Some(protocol::Type::S3(s3)) if !s3.region.is_empty() => Some(s3.region.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3_protocol(region: &str) -> Protocol {
        Protocol {
            r#type: Some(protocol::Type::S3(S3 {
                region: region.to_string(),
                ..Default::default()
            })),
        }
    }

    #[test]
    fn s3_region_reads_region_from_s3_protocol() {
        let protocol = s3_protocol("eu-west-1");
        assert_eq!(s3_region(Some(&protocol)), Some("eu-west-1"));
    }

    #[test]
    fn s3_region_ignores_empty_region() {
        let protocol = s3_protocol("");
        assert_eq!(s3_region(Some(&protocol)), None);
    }

    #[test]
    fn s3_region_ignores_other_protocols() {
        let protocol = Protocol {
            r#type: Some(protocol::Type::AzureBlob(AzureBlob {
                storage_account: "acct".to_string(),
            })),
        };
        assert_eq!(s3_region(Some(&protocol)), None);
        assert_eq!(s3_region(None), None);
        assert_eq!(s3_region(Some(&Protocol::default())), None);
    }
}
