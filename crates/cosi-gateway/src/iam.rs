//! IAM gateway: principals, policy attachments and access keys
//!
//! Provides a trait-based abstraction over the appliance's IAM-compatible
//! endpoint, allowing tests to mock it while production code goes through
//! the AWS SDK. Every trait method is exactly one remote operation (list
//! methods page internally).

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_iam::config::{BehaviorVersion, Credentials, Region};
use aws_smithy_runtime_api::client::orchestrator::HttpRequest;
use tracing::debug;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

use cosi_common::{Error, Result};

use crate::config::ApplianceConfig;
use crate::translate::{tolerate_not_found, translate};
use crate::types::{AccessKeyPair, IamUser};

/// Trait abstracting the appliance's IAM operations
///
/// Cleanup operations (`delete_access_key`, `detach_user_policy`,
/// `delete_user`) treat NotFound as success so compensation can be repeated.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait IamGateway: Send + Sync {
    /// Create a user. Fails with AlreadyExists if the name is taken.
    async fn create_user(&self, username: &str) -> Result<IamUser>;

    /// Attach a managed policy to a user. Attaching twice succeeds.
    async fn attach_user_policy(&self, username: &str, policy_arn: &str) -> Result<()>;

    /// Mint an access key. The secret is only ever returned here.
    async fn create_access_key(&self, username: &str) -> Result<AccessKeyPair>;

    /// Delete one access key
    async fn delete_access_key(&self, username: &str, access_key_id: &str) -> Result<()>;

    /// Detach a managed policy from a user
    async fn detach_user_policy(&self, username: &str, policy_arn: &str) -> Result<()>;

    /// Delete a user. The user must have no keys or attached policies left.
    async fn delete_user(&self, username: &str) -> Result<()>;

    /// Every user on the appliance
    async fn list_users(&self) -> Result<Vec<IamUser>>;

    /// Ids of a user's access keys; empty if the user does not exist
    async fn list_access_keys(&self, username: &str) -> Result<Vec<String>>;

    /// ARNs of a user's attached policies; empty if the user does not exist
    async fn list_attached_user_policies(&self, username: &str) -> Result<Vec<String>>;
}

/// Real IAM gateway backed by the AWS SDK
#[derive(Clone)]
pub struct IamClient {
    client: aws_sdk_iam::Client,
    headers: Arc<Vec<(String, String)>>,
}

impl IamClient {
    /// Build a client from the appliance configuration
    pub fn new(config: &ApplianceConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.iam_endpoint_url()?;

        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "objectscale-cosi",
        );

        let sdk_config = aws_sdk_iam::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.default_region.clone()))
            .endpoint_url(endpoint.clone())
            .behavior_version(BehaviorVersion::latest())
            .build();

        debug!(endpoint = %endpoint, headers = config.iam_headers.len(), "IAM client configured");

        Ok(Self {
            client: aws_sdk_iam::Client::from_conf(sdk_config),
            headers: Arc::new(config.iam_headers.clone()),
        })
    }

    /// Add a header to every request made through this client
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let (name, value) = (name.into(), value.into());
        crate::config::validate_header(&name, &value)?;
        Arc::make_mut(&mut self.headers).push((name, value));
        Ok(self)
    }

    /// Request hook that applies the routing headers
    fn header_hook(&self) -> impl Fn(&mut HttpRequest) + Send + Sync + 'static {
        let headers = self.headers.clone();
        move |request: &mut HttpRequest| {
            for (name, value) in headers.iter() {
                request.headers_mut().insert(name.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl IamGateway for IamClient {
    async fn create_user(&self, username: &str) -> Result<IamUser> {
        let output = self
            .client
            .create_user()
            .user_name(username)
            .customize()
            .mutate_request(self.header_hook())
            .send()
            .await
            .map_err(|e| translate("CreateUser", e))?;

        Ok(output
            .user()
            .map(IamUser::from)
            .unwrap_or_else(|| IamUser::named(username)))
    }

    async fn attach_user_policy(&self, username: &str, policy_arn: &str) -> Result<()> {
        self.client
            .attach_user_policy()
            .user_name(username)
            .policy_arn(policy_arn)
            .customize()
            .mutate_request(self.header_hook())
            .send()
            .await
            .map_err(|e| translate("AttachUserPolicy", e))?;
        Ok(())
    }

    async fn create_access_key(&self, username: &str) -> Result<AccessKeyPair> {
        let output = self
            .client
            .create_access_key()
            .user_name(username)
            .customize()
            .mutate_request(self.header_hook())
            .send()
            .await
            .map_err(|e| translate("CreateAccessKey", e))?;

        let key = output.access_key().ok_or_else(|| {
            Error::internal_with_context("CreateAccessKey", "response carried no access key")
        })?;

        Ok(AccessKeyPair {
            access_key_id: key.access_key_id().to_string(),
            secret_access_key: key.secret_access_key().to_string(),
        })
    }

    async fn delete_access_key(&self, username: &str, access_key_id: &str) -> Result<()> {
        let result = self
            .client
            .delete_access_key()
            .user_name(username)
            .access_key_id(access_key_id)
            .customize()
            .mutate_request(self.header_hook())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| translate("DeleteAccessKey", e));
        tolerate_not_found(result)
    }

    async fn detach_user_policy(&self, username: &str, policy_arn: &str) -> Result<()> {
        let result = self
            .client
            .detach_user_policy()
            .user_name(username)
            .policy_arn(policy_arn)
            .customize()
            .mutate_request(self.header_hook())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| translate("DetachUserPolicy", e));
        tolerate_not_found(result)
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        let result = self
            .client
            .delete_user()
            .user_name(username)
            .customize()
            .mutate_request(self.header_hook())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| translate("DeleteUser", e));
        tolerate_not_found(result)
    }

    async fn list_users(&self) -> Result<Vec<IamUser>> {
        let mut users = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_users()
                .set_marker(marker.take())
                .customize()
                .mutate_request(self.header_hook())
                .send()
                .await
                .map_err(|e| translate("ListUsers", e))?;

            users.extend(output.users().iter().map(IamUser::from));

            match (output.is_truncated(), output.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(users)
    }

    async fn list_access_keys(&self, username: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let result = self
                .client
                .list_access_keys()
                .user_name(username)
                .set_marker(marker.take())
                .customize()
                .mutate_request(self.header_hook())
                .send()
                .await
                .map_err(|e| translate("ListAccessKeys", e));

            let output = match result {
                Ok(output) => output,
                Err(e) if e.is_not_found() => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };

            keys.extend(
                output
                    .access_key_metadata()
                    .iter()
                    .filter_map(|k| k.access_key_id().map(str::to_string)),
            );

            match (output.is_truncated(), output.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn list_attached_user_policies(&self, username: &str) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let result = self
                .client
                .list_attached_user_policies()
                .user_name(username)
                .set_marker(marker.take())
                .customize()
                .mutate_request(self.header_hook())
                .send()
                .await
                .map_err(|e| translate("ListAttachedUserPolicies", e));

            let output = match result {
                Ok(output) => output,
                Err(e) if e.is_not_found() => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };

            arns.extend(
                output
                    .attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_arn().map(str::to_string)),
            );

            match (output.is_truncated(), output.marker()) {
                (true, Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(arns)
    }
}
