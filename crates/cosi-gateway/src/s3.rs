//! S3 gateway: bucket lifecycle on the appliance

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use tracing::debug;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use cosi_common::Result;

use crate::config::ApplianceConfig;
use crate::translate::translate;

/// Trait abstracting the appliance's S3 bucket operations
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait S3Gateway: Send + Sync {
    /// Create a bucket in `region`, or the default region when empty.
    ///
    /// Fails with AlreadyExists whether or not the caller owns the existing
    /// bucket.
    async fn create_bucket(&self, name: &str, region: &str) -> Result<()>;

    /// Delete a bucket. NotFound is returned to the caller.
    async fn delete_bucket(&self, name: &str) -> Result<()>;

    /// Whether a bucket exists
    async fn bucket_exists(&self, name: &str) -> Result<bool>;
}

/// Real S3 gateway backed by the AWS SDK
#[derive(Clone)]
pub struct S3Client {
    client: aws_sdk_s3::Client,
    default_region: String,
}

impl S3Client {
    /// Build a path-style client from the appliance configuration
    pub fn new(config: &ApplianceConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.s3_endpoint_url()?;

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "objectscale-cosi",
        );

        let sdk_config = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.default_region.clone()))
            .endpoint_url(endpoint.clone())
            .force_path_style(true)
            .behavior_version(BehaviorVersion::latest())
            .build();

        debug!(endpoint = %endpoint, region = %config.default_region, "S3 client configured");

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(sdk_config),
            default_region: config.default_region.clone(),
        })
    }

    fn region_or_default<'a>(&'a self, region: &'a str) -> &'a str {
        if region.is_empty() {
            &self.default_region
        } else {
            region
        }
    }
}

#[async_trait]
impl S3Gateway for S3Client {
    async fn create_bucket(&self, name: &str, region: &str) -> Result<()> {
        let region = self.region_or_default(region).to_string();

        self.client
            .create_bucket()
            .bucket(name)
            .customize()
            .config_override(aws_sdk_s3::config::Builder::default().region(Region::new(region)))
            .send()
            .await
            .map_err(|e| translate("CreateBucket", e))?;
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(name)
            .send()
            .await
            .map_err(|e| translate("DeleteBucket", e))?;
        Ok(())
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(name).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = translate("HeadBucket", e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }
}
