//! In-memory appliance for integration tests
//!
//! Implements both gateway traits over shared state, with per-operation
//! failure and delay injection.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use cosi_common::retry::RetryConfig;
use cosi_common::{Error, ErrorKind, Result};
use cosi_gateway::{AccessKeyPair, IamGateway, IamUser, S3Gateway};
use cosi_provisioner::{EngineSettings, ProvisioningEngine};

pub const ENDPOINT: &str = "https://objectscale.test:9021";

#[derive(Debug, Default, Clone)]
pub struct Principal {
    pub policies: BTreeSet<String>,
    /// access key id -> secret
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    /// bucket -> (region, object count)
    buckets: BTreeMap<String, (String, usize)>,
    users: BTreeMap<String, Principal>,
    failures: HashMap<&'static str, VecDeque<ErrorKind>>,
    /// Failures reported after the change was applied
    failures_after: HashMap<&'static str, VecDeque<ErrorKind>>,
    delays_before: HashMap<&'static str, Duration>,
    delays_after: HashMap<&'static str, Duration>,
    calls: Vec<String>,
}

/// Fake ObjectScale appliance
#[derive(Clone, Default)]
pub struct FakeAppliance {
    state: Arc<Mutex<State>>,
}

impl FakeAppliance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call to `operation` with `kind`
    pub fn fail_next(&self, operation: &'static str, kind: ErrorKind) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(kind);
    }

    /// Apply the next call to `operation`, then report it failed with `kind`
    pub fn fail_after(&self, operation: &'static str, kind: ErrorKind) {
        self.lock()
            .failures_after
            .entry(operation)
            .or_default()
            .push_back(kind);
    }

    /// Sleep before `operation` touches state
    pub fn delay_before(&self, operation: &'static str, delay: Duration) {
        self.lock().delays_before.insert(operation, delay);
    }

    /// Sleep after `operation` touched state, before it responds
    pub fn delay_after(&self, operation: &'static str, delay: Duration) {
        self.lock().delays_after.insert(operation, delay);
    }

    pub fn add_bucket(&self, name: &str) {
        self.lock()
            .buckets
            .insert(name.to_string(), ("us-east-1".to_string(), 0));
    }

    pub fn put_object(&self, bucket: &str) {
        if let Some((_, objects)) = self.lock().buckets.get_mut(bucket) {
            *objects += 1;
        }
    }

    pub fn buckets(&self) -> Vec<String> {
        self.lock().buckets.keys().cloned().collect()
    }

    pub fn bucket_region(&self, bucket: &str) -> Option<String> {
        self.lock().buckets.get(bucket).map(|(r, _)| r.clone())
    }

    pub fn add_user(&self, name: &str) {
        self.lock().users.insert(name.to_string(), Principal::default());
    }

    pub fn principals(&self) -> BTreeMap<String, Principal> {
        self.lock().users.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Username owning this key pair, if it authenticates
    pub fn authenticate(&self, access_key_id: &str, secret: &str) -> Option<String> {
        self.lock().users.iter().find_map(|(name, p)| {
            (p.keys.get(access_key_id).map(String::as_str) == Some(secret)).then(|| name.clone())
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake appliance state poisoned")
    }

    /// Record the call, apply the delay and any injected failure
    async fn enter(&self, operation: &'static str) -> Result<()> {
        let (delay, failure) = {
            let mut state = self.lock();
            state.calls.push(operation.to_string());
            let delay = state.delays_before.get(operation).copied();
            let failure = state
                .failures
                .get_mut(operation)
                .and_then(VecDeque::pop_front);
            (delay, failure)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(kind) => Err(Error::appliance(operation, kind, "injected failure")),
            None => Ok(()),
        }
    }

    /// Apply the delay and any failure injected after the change
    async fn leave(&self, operation: &'static str) -> Result<()> {
        let (delay, failure) = {
            let mut state = self.lock();
            let delay = state.delays_after.get(operation).copied();
            let failure = state
                .failures_after
                .get_mut(operation)
                .and_then(VecDeque::pop_front);
            (delay, failure)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(kind) => Err(Error::appliance(operation, kind, "injected failure after apply")),
            None => Ok(()),
        }
    }

    fn not_found(operation: &str, what: &str) -> Error {
        Error::appliance(operation, ErrorKind::NotFound, format!("{what} not found"))
    }
}

#[async_trait]
impl S3Gateway for FakeAppliance {
    async fn create_bucket(&self, name: &str, region: &str) -> Result<()> {
        self.enter("CreateBucket").await?;
        {
            let mut state = self.lock();
            if state.buckets.contains_key(name) {
                return Err(Error::appliance_with_code(
                    "CreateBucket",
                    ErrorKind::AlreadyExists,
                    "BucketAlreadyOwnedByYou",
                    "bucket already exists",
                ));
            }
            let region = if region.is_empty() { "us-east-1" } else { region };
            state
                .buckets
                .insert(name.to_string(), (region.to_string(), 0));
        }
        self.leave("CreateBucket").await?;
        Ok(())
    }

    async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.enter("DeleteBucket").await?;
        let mut state = self.lock();
        match state.buckets.get(name) {
            None => Err(Self::not_found("DeleteBucket", "bucket")),
            Some((_, objects)) if *objects > 0 => Err(Error::appliance_with_code(
                "DeleteBucket",
                ErrorKind::Internal,
                "BucketNotEmpty",
                "bucket not empty",
            )),
            Some(_) => {
                state.buckets.remove(name);
                Ok(())
            }
        }
    }

    async fn bucket_exists(&self, name: &str) -> Result<bool> {
        self.enter("HeadBucket").await?;
        Ok(self.lock().buckets.contains_key(name))
    }
}

#[async_trait]
impl IamGateway for FakeAppliance {
    async fn create_user(&self, username: &str) -> Result<IamUser> {
        self.enter("CreateUser").await?;
        {
            let mut state = self.lock();
            if state.users.contains_key(username) {
                return Err(Error::appliance(
                    "CreateUser",
                    ErrorKind::AlreadyExists,
                    "EntityAlreadyExists",
                ));
            }
            state
                .users
                .insert(username.to_string(), Principal::default());
        }
        self.leave("CreateUser").await?;
        Ok(IamUser::named(username))
    }

    async fn attach_user_policy(&self, username: &str, policy_arn: &str) -> Result<()> {
        self.enter("AttachUserPolicy").await?;
        {
            let mut state = self.lock();
            let user = state
                .users
                .get_mut(username)
                .ok_or_else(|| Self::not_found("AttachUserPolicy", "user"))?;
            user.policies.insert(policy_arn.to_string());
        }
        self.leave("AttachUserPolicy").await?;
        Ok(())
    }

    async fn create_access_key(&self, username: &str) -> Result<AccessKeyPair> {
        self.enter("CreateAccessKey").await?;
        let pair = {
            let mut state = self.lock();
            let user = state
                .users
                .get_mut(username)
                .ok_or_else(|| Self::not_found("CreateAccessKey", "user"))?;
            let pair = AccessKeyPair {
                access_key_id: format!("AK{}", Uuid::new_v4().simple()),
                secret_access_key: Uuid::new_v4().to_string(),
            };
            user.keys
                .insert(pair.access_key_id.clone(), pair.secret_access_key.clone());
            pair
        };
        self.leave("CreateAccessKey").await?;
        Ok(pair)
    }

    async fn delete_access_key(&self, username: &str, access_key_id: &str) -> Result<()> {
        self.enter("DeleteAccessKey").await?;
        if let Some(user) = self.lock().users.get_mut(username) {
            user.keys.remove(access_key_id);
        }
        Ok(())
    }

    async fn detach_user_policy(&self, username: &str, policy_arn: &str) -> Result<()> {
        self.enter("DetachUserPolicy").await?;
        if let Some(user) = self.lock().users.get_mut(username) {
            user.policies.remove(policy_arn);
        }
        Ok(())
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        self.enter("DeleteUser").await?;
        let mut state = self.lock();
        match state.users.get(username) {
            None => Ok(()),
            Some(user) if !user.keys.is_empty() || !user.policies.is_empty() => {
                Err(Error::appliance_with_code(
                    "DeleteUser",
                    ErrorKind::Internal,
                    "DeleteConflict",
                    "user still has keys or policies",
                ))
            }
            Some(_) => {
                state.users.remove(username);
                Ok(())
            }
        }
    }

    async fn list_users(&self) -> Result<Vec<IamUser>> {
        self.enter("ListUsers").await?;
        Ok(self.lock().users.keys().map(IamUser::named).collect())
    }

    async fn list_access_keys(&self, username: &str) -> Result<Vec<String>> {
        self.enter("ListAccessKeys").await?;
        Ok(self
            .lock()
            .users
            .get(username)
            .map(|u| u.keys.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_attached_user_policies(&self, username: &str) -> Result<Vec<String>> {
        self.enter("ListAttachedUserPolicies").await?;
        Ok(self
            .lock()
            .users
            .get(username)
            .map(|u| u.policies.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// Engine over `appliance` with fast cleanup retries and a short grace window
pub fn engine(appliance: &FakeAppliance) -> ProvisioningEngine {
    let settings = EngineSettings {
        compensation_grace: Duration::from_secs(2),
        cleanup_retry: RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryConfig::default()
        },
        ..EngineSettings::new(ENDPOINT)
    };
    ProvisioningEngine::new(
        Arc::new(appliance.clone()),
        Arc::new(appliance.clone()),
        settings,
    )
}
