//! Connection settings for the appliance
//!
//! Built once at startup by the provisioner's CLI layer and consumed by
//! [`IamClient::new`](crate::IamClient::new) and
//! [`S3Client::new`](crate::S3Client::new).

use std::fmt;

use cosi_common::{Error, Result, DEFAULT_REGION, NAMESPACE_HEADER};

/// Appliance endpoints, admin credentials and request shaping
#[derive(Clone)]
pub struct ApplianceConfig {
    /// S3 base URL, as given (scheme optional)
    pub endpoint: String,
    /// IAM base URL override; the S3 endpoint is used when unset
    pub iam_endpoint: Option<String>,
    /// Provisioner's own access key id
    pub access_key_id: String,
    /// Provisioner's own secret key
    pub secret_access_key: String,
    /// Region applied when the caller supplies none
    pub default_region: String,
    /// Permit plain HTTP endpoints
    pub disable_tls: bool,
    /// Headers injected into every IAM request
    pub iam_headers: Vec<(String, String)>,
}

impl fmt::Debug for ApplianceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplianceConfig")
            .field("endpoint", &self.endpoint)
            .field("iam_endpoint", &self.iam_endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("default_region", &self.default_region)
            .field("disable_tls", &self.disable_tls)
            .field("iam_headers", &self.iam_headers)
            .finish()
    }
}

impl ApplianceConfig {
    /// Create a config with defaults for everything but endpoint and credentials
    pub fn new(
        endpoint: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            iam_endpoint: None,
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            default_region: DEFAULT_REGION.to_string(),
            disable_tls: false,
            iam_headers: Vec::new(),
        }
    }

    /// Route IAM calls to an ObjectScale account namespace
    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        self.with_iam_header(NAMESPACE_HEADER, namespace)
    }

    /// Add a header to every IAM request
    pub fn with_iam_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.iam_headers.push((name.into(), value.into()));
        self
    }

    /// Check everything that can be checked without talking to the appliance
    pub fn validate(&self) -> Result<()> {
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(Error::configuration(
                "appliance access key id and secret are required",
            ));
        }
        if self.default_region.is_empty() {
            return Err(Error::configuration("default region must not be empty"));
        }
        self.s3_endpoint_url()?;
        self.iam_endpoint_url()?;
        for (name, value) in &self.iam_headers {
            validate_header(name, value)?;
        }
        Ok(())
    }

    /// Fully qualified S3 endpoint URL
    pub fn s3_endpoint_url(&self) -> Result<String> {
        resolve_endpoint(&self.endpoint, self.disable_tls)
    }

    /// Fully qualified IAM endpoint URL
    pub fn iam_endpoint_url(&self) -> Result<String> {
        resolve_endpoint(
            self.iam_endpoint.as_deref().unwrap_or(&self.endpoint),
            self.disable_tls,
        )
    }
}

/// Add a scheme to a bare endpoint and enforce the TLS setting.
///
/// `host:port` becomes `http://host:port` when TLS is disabled and
/// `https://host:port` otherwise. An explicit `http://` URL requires TLS to be
/// disabled.
pub fn resolve_endpoint(endpoint: &str, disable_tls: bool) -> Result<String> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err(Error::configuration("appliance endpoint must not be empty"));
    }

    if let Some(rest) = endpoint.strip_prefix("http://") {
        if !disable_tls {
            return Err(Error::configuration(format!(
                "endpoint http://{rest} uses plain HTTP; set disable-tls to allow it"
            )));
        }
        return Ok(endpoint.to_string());
    }
    if endpoint.starts_with("https://") {
        return Ok(endpoint.to_string());
    }
    if endpoint.contains("://") {
        return Err(Error::configuration(format!(
            "endpoint {endpoint} has an unsupported scheme"
        )));
    }

    let scheme = if disable_tls { "http" } else { "https" };
    Ok(format!("{scheme}://{endpoint}"))
}

/// Reject header names and values the HTTP layer would refuse.
pub fn validate_header(name: &str, value: &str) -> Result<()> {
    let name_ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
    if !name_ok {
        return Err(Error::configuration(format!("invalid header name '{name}'")));
    }
    if !value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b)) {
        return Err(Error::configuration(format!(
            "invalid value for header '{name}'"
        )));
    }
    Ok(())
}
