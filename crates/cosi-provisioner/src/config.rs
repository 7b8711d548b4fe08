//! Command-line configuration
//!
//! Every flag has an environment fallback so the provisioner can be
//! configured entirely from a pod spec.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use cosi_common::retry::RetryConfig;
use cosi_common::telemetry::{LogFormat, TelemetryConfig};
use cosi_common::{
    Error, Result, DEFAULT_COMPENSATION_GRACE_SECS, DEFAULT_COSI_ENDPOINT,
    DEFAULT_PROVISIONER_NAME, DEFAULT_REGION, S3_FULL_ACCESS_POLICY_ARN,
};
use cosi_gateway::ApplianceConfig;

use crate::engine::EngineSettings;

/// ObjectScale COSI provisioner
#[derive(Parser, Debug, Clone)]
#[command(name = "objectscale-cosi-provisioner", version, about, long_about = None)]
pub struct Cli {
    /// Appliance S3 base URL (scheme optional)
    #[arg(long, env = "OBJECTSCALE_ENDPOINT")]
    pub endpoint: String,

    /// Appliance IAM base URL, when it differs from the S3 endpoint
    #[arg(long, env = "OBJECTSCALE_IAM_ENDPOINT")]
    pub iam_endpoint: Option<String>,

    /// Access key id of the provisioner's own appliance account
    #[arg(long, env = "OBJECTSCALE_ACCESS_KEY_ID")]
    pub access_key_id: String,

    /// Secret of the provisioner's own appliance account
    #[arg(long, env = "OBJECTSCALE_SECRET_KEY_ID", hide_env_values = true)]
    pub secret_key_id: String,

    /// Region used when a bucket request names none
    #[arg(long, env = "OBJECTSCALE_DEFAULT_REGION", default_value = DEFAULT_REGION)]
    pub default_region: String,

    /// Policy attached to every granted principal
    #[arg(long, env = "OBJECTSCALE_POLICY_ARN", default_value = S3_FULL_ACCESS_POLICY_ARN)]
    pub policy_arn: String,

    /// Permit plain HTTP endpoints
    #[arg(long, env = "OBJECTSCALE_DISABLE_TLS")]
    pub disable_tls: bool,

    /// ObjectScale account namespace for IAM calls (x-emc-namespace)
    #[arg(long, env = "OBJECTSCALE_NAMESPACE")]
    pub namespace: Option<String>,

    /// Extra header for every IAM request, as NAME=VALUE (repeatable)
    #[arg(long = "iam-header", value_parser = parse_header)]
    pub iam_headers: Vec<(String, String)>,

    /// Where to serve gRPC: unix:///path or tcp://host:port
    #[arg(long, env = "COSI_ENDPOINT", default_value = DEFAULT_COSI_ENDPOINT)]
    pub listen: ListenAddr,

    /// Name reported by the Identity service
    #[arg(long, env = "COSI_PROVISIONER_NAME", default_value = DEFAULT_PROVISIONER_NAME)]
    pub provisioner_name: String,

    /// Seconds compensation may keep running after a request is canceled
    #[arg(
        long,
        env = "COSI_COMPENSATION_GRACE_SECS",
        default_value_t = DEFAULT_COMPENSATION_GRACE_SECS
    )]
    pub compensation_grace_secs: u64,

    /// Log output format: json or text
    #[arg(long, env = "COSI_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Appliance connection settings
    pub fn appliance_config(&self) -> ApplianceConfig {
        let mut config = ApplianceConfig::new(
            self.endpoint.clone(),
            self.access_key_id.clone(),
            self.secret_key_id.clone(),
        );
        config.iam_endpoint = self.iam_endpoint.clone();
        config.default_region = self.default_region.clone();
        config.disable_tls = self.disable_tls;

        if let Some(namespace) = &self.namespace {
            config = config.with_namespace(namespace.clone());
        }
        for (name, value) in &self.iam_headers {
            config = config.with_iam_header(name.clone(), value.clone());
        }
        config
    }

    /// Engine settings; the envelope endpoint is the resolved S3 URL
    pub fn engine_settings(&self, appliance: &ApplianceConfig) -> Result<EngineSettings> {
        if self.policy_arn.is_empty() {
            return Err(Error::configuration("policy arn must not be empty"));
        }

        Ok(EngineSettings {
            endpoint: appliance.s3_endpoint_url()?,
            default_region: self.default_region.clone(),
            policy_arn: self.policy_arn.clone(),
            compensation_grace: Duration::from_secs(self.compensation_grace_secs),
            cleanup_retry: RetryConfig::default(),
        })
    }

    /// Logging setup
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            format: self.log_format,
            ..TelemetryConfig::default()
        }
    }
}

/// Parse a `NAME=VALUE` header flag
fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    cosi_gateway::config::validate_header(name, value).map_err(|e| e.to_string())?;
    Ok((name.to_string(), value.to_string()))
}

/// Address the gRPC server binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// Unix domain socket path
    Unix(PathBuf),
    /// TCP `host:port`
    Tcp(String),
}

impl FromStr for ListenAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::configuration("unix listen address needs a path"));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = s.strip_prefix("tcp://") {
            if !addr.contains(':') {
                return Err(Error::configuration(format!(
                    "tcp listen address '{addr}' needs a port"
                )));
            }
            return Ok(Self::Tcp(addr.to_string()));
        }
        Err(Error::configuration(format!(
            "listen address '{s}' must start with unix:// or tcp://"
        )))
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}
