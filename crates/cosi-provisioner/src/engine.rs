//! Provisioning engine
//!
//! Composes the IAM and S3 gateways into the four COSI verbs. The engine
//! holds no state of its own: every verb is a short sequence of remote calls,
//! each raced against the request's cancellation token, with compensation
//! undoing the partial work of a failed grant.
//!
//! Grant state machine:
//!
//! ```text
//! ∅ ──CreateUser──► Created ──AttachPolicy──► PolicyAttached ──CreateAccessKey──► Live
//! ```
//!
//! Compensation and revocation walk it backwards, treating NotFound as done.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use cosi_common::retry::{retry_transient, RetryConfig};
use cosi_common::{
    Error, ErrorKind, Result, DEFAULT_COMPENSATION_GRACE_SECS, DEFAULT_REGION,
    S3_FULL_ACCESS_POLICY_ARN,
};
use cosi_gateway::{IamGateway, S3Gateway};
use cosi_proto::{s3_region, AuthenticationType, Protocol};

use crate::envelope::CredentialEnvelope;
use crate::principal::{generate_username, parse_account_id};

/// Engine behaviour that is fixed at startup
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// S3 endpoint URL written into credential envelopes
    pub endpoint: String,
    /// Region used when a create request names none
    pub default_region: String,
    /// Policy attached to every granted principal
    pub policy_arn: String,
    /// How long compensation may keep running once the request is canceled
    pub compensation_grace: Duration,
    /// Retry applied to each compensation step
    pub cleanup_retry: RetryConfig,
}

impl EngineSettings {
    /// Settings with defaults for everything but the workload-facing endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            default_region: DEFAULT_REGION.to_string(),
            policy_arn: S3_FULL_ACCESS_POLICY_ARN.to_string(),
            compensation_grace: Duration::from_secs(DEFAULT_COMPENSATION_GRACE_SECS),
            cleanup_retry: RetryConfig::default(),
        }
    }
}

/// Result of a successful grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Opaque id the orchestrator passes back on revoke
    pub account_id: String,
    /// Serialized [`CredentialEnvelope`]
    pub credentials: String,
}

/// How teardown calls are issued
#[derive(Clone, Copy)]
enum Cleanup<'a> {
    /// Revoke: one attempt per call, abandoned on cancellation
    Revoke(&'a CancellationToken),
    /// Compensation: transient failures retried, never raced against the token
    Compensate,
}

/// Stateless composition of the appliance gateways
#[derive(Clone)]
pub struct ProvisioningEngine {
    iam: Arc<dyn IamGateway>,
    s3: Arc<dyn S3Gateway>,
    settings: Arc<EngineSettings>,
}

impl ProvisioningEngine {
    /// Create an engine over the given gateways
    pub fn new(
        iam: Arc<dyn IamGateway>,
        s3: Arc<dyn S3Gateway>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            iam,
            s3,
            settings: Arc::new(settings),
        }
    }

    /// Settings this engine was built with
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Create a bucket and return its id (the bucket name).
    ///
    /// On cancellation the engine checks, within the grace window, whether
    /// the bucket landed anyway and records the answer in the error.
    #[instrument(skip(self, protocol, cancel))]
    pub async fn create_bucket(
        &self,
        name: &str,
        protocol: Option<&Protocol>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if name.is_empty() {
            return Err(Error::validation("bucket name must not be empty"));
        }

        let region = s3_region(protocol).unwrap_or(self.settings.default_region.as_str());
        info!(bucket = %name, region = %region, "Creating bucket");

        match cancellable(cancel, "CreateBucket", self.s3.create_bucket(name, region)).await {
            Ok(()) => {
                info!(bucket = %name, "Bucket created");
                Ok(name.to_string())
            }
            Err(e) if e.is_canceled() => {
                let applied = self.probe_bucket(name).await;
                warn!(bucket = %name, applied = ?applied, "CreateBucket canceled");
                Err(Error::canceled_with_outcome("CreateBucket", applied))
            }
            Err(e) => {
                error!(bucket = %name, error = %e, "CreateBucket failed");
                Err(e)
            }
        }
    }

    /// Delete a bucket. A bucket that is already gone counts as deleted.
    #[instrument(skip(self, cancel))]
    pub async fn delete_bucket(&self, bucket_id: &str, cancel: &CancellationToken) -> Result<()> {
        if bucket_id.is_empty() {
            return Err(Error::validation("bucket id must not be empty"));
        }

        info!(bucket = %bucket_id, "Deleting bucket");
        match cancellable(cancel, "DeleteBucket", self.s3.delete_bucket(bucket_id)).await {
            Ok(()) => {
                info!(bucket = %bucket_id, "Bucket deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(bucket = %bucket_id, "Bucket already absent");
                Ok(())
            }
            Err(e) => {
                error!(bucket = %bucket_id, error = %e, "DeleteBucket failed");
                Err(e)
            }
        }
    }

    /// Create a principal with S3 access and return its credentials.
    ///
    /// Every call mints a new principal. Partial work is compensated before
    /// the first error is returned.
    #[instrument(skip(self, authentication_type, cancel))]
    pub async fn grant_access(
        &self,
        bucket_id: &str,
        account_name: &str,
        authentication_type: AuthenticationType,
        cancel: &CancellationToken,
    ) -> Result<Grant> {
        if bucket_id.is_empty() {
            return Err(Error::validation("bucket id must not be empty"));
        }
        if authentication_type == AuthenticationType::Iam {
            return Err(Error::validation(
                "IAM authentication is not supported; use key authentication",
            ));
        }

        let exists = cancellable(cancel, "HeadBucket", self.s3.bucket_exists(bucket_id)).await?;
        if !exists {
            warn!(bucket = %bucket_id, "Grant requested for a bucket that does not exist");
            return Err(Error::appliance(
                "HeadBucket",
                ErrorKind::NotFound,
                format!("bucket {bucket_id} does not exist"),
            ));
        }

        let username = generate_username();
        info!(bucket = %bucket_id, username = %username, "Granting bucket access");

        if let Err(e) = cancellable(cancel, "CreateUser", self.iam.create_user(&username)).await {
            // A collision means the name belongs to someone else; leave it alone.
            if e.is_already_exists() {
                error!(username = %username, error = %e, "CreateUser collided with an existing user");
            } else {
                self.fail_grant(&username, &e, cancel).await;
            }
            return Err(e);
        }

        let policy_arn = self.settings.policy_arn.as_str();
        if let Err(e) = cancellable(
            cancel,
            "AttachUserPolicy",
            self.iam.attach_user_policy(&username, policy_arn),
        )
        .await
        {
            self.fail_grant(&username, &e, cancel).await;
            return Err(e);
        }

        let key = match cancellable(
            cancel,
            "CreateAccessKey",
            self.iam.create_access_key(&username),
        )
        .await
        {
            Ok(key) => key,
            Err(e) => {
                self.fail_grant(&username, &e, cancel).await;
                return Err(e);
            }
        };

        let envelope = CredentialEnvelope {
            endpoint: self.settings.endpoint.clone(),
            access_key_id: key.access_key_id,
            secret_key_id: key.secret_access_key,
            bucket: bucket_id.to_string(),
        };
        let credentials = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                self.fail_grant(&username, &e, cancel).await;
                return Err(e);
            }
        };

        // Nobody is left to receive the credentials.
        if cancel.is_cancelled() {
            let e = Error::canceled("GrantAccess");
            self.fail_grant(&username, &e, cancel).await;
            return Err(e);
        }

        info!(
            bucket = %bucket_id,
            username = %username,
            access_key_id = %envelope.access_key_id,
            "Bucket access granted"
        );
        Ok(Grant {
            account_id: username,
            credentials,
        })
    }

    /// Remove a principal created by [`grant_access`](Self::grant_access).
    ///
    /// Deletes every access key, detaches every policy, then deletes the
    /// user. Anything already gone counts as removed. Failures are collected
    /// and the most severe is returned.
    #[instrument(skip(self, cancel))]
    pub async fn revoke_access(
        &self,
        bucket_id: &str,
        account_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if bucket_id.is_empty() {
            return Err(Error::validation("bucket id must not be empty"));
        }
        let username = parse_account_id(account_id)?;

        info!(bucket = %bucket_id, username = %username, "Revoking bucket access");
        let failures = self.teardown(username, Cleanup::Revoke(cancel)).await;

        match most_severe(failures) {
            None => {
                info!(bucket = %bucket_id, username = %username, "Bucket access revoked");
                Ok(())
            }
            Some(e) => {
                error!(bucket = %bucket_id, username = %username, error = %e, "RevokeAccess failed");
                Err(e)
            }
        }
    }

    /// Remove everything a failed grant may have created.
    ///
    /// A failed call may still have been applied with its response lost, so
    /// compensation works from the username: list and delete keys, list and detach policies, then
    /// delete the user. Nothing created yet means nothing is found.
    async fn fail_grant(&self, username: &str, cause: &Error, cancel: &CancellationToken) {
        if cause.is_canceled() {
            warn!(username = %username, error = %cause, "Grant canceled, removing principal");
        } else {
            error!(username = %username, error = %cause, "Grant failed, compensating");
        }
        let work = self.teardown(username, Cleanup::Compensate);
        self.compensate(username, cause, cancel, work).await;
    }

    /// Run compensation work inside the grace window and report failures.
    ///
    /// The window opens when `cancel` fires; until then compensation runs
    /// unbounded (each step still has bounded retries).
    async fn compensate<F>(&self, username: &str, cause: &Error, cancel: &CancellationToken, work: F)
    where
        F: Future<Output = Vec<Error>>,
    {
        let grace = self.settings.compensation_grace;
        let deadline = async {
            cancel.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            biased;
            failures = work => {
                for failure in &failures {
                    error!(
                        username = %username,
                        original_error = %cause,
                        error = %failure,
                        "compensation failed"
                    );
                }
                if failures.is_empty() {
                    info!(username = %username, "Compensation complete");
                }
            }
            _ = deadline => {
                error!(
                    username = %username,
                    original_error = %cause,
                    grace_secs = grace.as_secs_f64(),
                    "compensation failed: grace window elapsed"
                );
            }
        }
    }

    /// Delete keys, detach policies, delete the user.
    ///
    /// Every key and policy is attempted; the user is only deleted when they
    /// all went away.
    async fn teardown(&self, username: &str, mode: Cleanup<'_>) -> Vec<Error> {
        let mut failures = Vec::new();

        match self
            .cleanup_call(mode, "ListAccessKeys", || self.iam.list_access_keys(username))
            .await
        {
            Ok(keys) => {
                for key_id in keys {
                    if let Err(e) = self
                        .cleanup_call(mode, "DeleteAccessKey", || {
                            self.iam.delete_access_key(username, &key_id)
                        })
                        .await
                    {
                        warn!(username = %username, access_key_id = %key_id, error = %e, "DeleteAccessKey failed");
                        failures.push(e);
                    }
                }
            }
            Err(e) => failures.push(e),
        }

        match self
            .cleanup_call(mode, "ListAttachedUserPolicies", || {
                self.iam.list_attached_user_policies(username)
            })
            .await
        {
            Ok(arns) => {
                for arn in arns {
                    if let Err(e) = self
                        .cleanup_call(mode, "DetachUserPolicy", || {
                            self.iam.detach_user_policy(username, &arn)
                        })
                        .await
                    {
                        warn!(username = %username, policy_arn = %arn, error = %e, "DetachUserPolicy failed");
                        failures.push(e);
                    }
                }
            }
            Err(e) => failures.push(e),
        }

        if failures.is_empty() {
            if let Err(e) = self
                .cleanup_call(mode, "DeleteUser", || self.iam.delete_user(username))
                .await
            {
                failures.push(e);
            }
        }

        failures
    }

    async fn cleanup_call<T, F, Fut>(&self, mode: Cleanup<'_>, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match mode {
            Cleanup::Revoke(cancel) => cancellable(cancel, operation, call()).await,
            Cleanup::Compensate => {
                retry_transient(&self.settings.cleanup_retry, operation, call).await
            }
        }
    }

    /// Whether the bucket exists, if that can be learned within the grace window.
    async fn probe_bucket(&self, name: &str) -> Option<bool> {
        match tokio::time::timeout(self.settings.compensation_grace, self.s3.bucket_exists(name))
            .await
        {
            Ok(Ok(exists)) => Some(exists),
            Ok(Err(e)) => {
                warn!(bucket = %name, error = %e, "Could not determine CreateBucket outcome");
                None
            }
            Err(_) => {
                warn!(bucket = %name, "CreateBucket outcome probe timed out");
                None
            }
        }
    }
}

/// Race a remote call against cancellation. A token that has already fired
/// stops the call from starting.
async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::canceled(operation)),
        result = call => result,
    }
}

/// Collapse accumulated failures into the one that decides the status.
fn most_severe(failures: Vec<Error>) -> Option<Error> {
    if let Some(canceled) = failures.iter().position(Error::is_canceled) {
        return failures.into_iter().nth(canceled);
    }
    failures
        .into_iter()
        .max_by_key(|e| e.kind().map(ErrorKind::severity).unwrap_or(0))
}
