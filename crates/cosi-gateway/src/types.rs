//! Values returned by the gateways

use std::fmt;

/// An IAM user on the appliance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamUser {
    /// User name (unique within the appliance namespace)
    pub user_name: String,
    /// ARN, when the appliance reported one
    pub arn: Option<String>,
}

impl IamUser {
    /// A user known only by name
    pub fn named(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            arn: None,
        }
    }
}

impl From<&aws_sdk_iam::types::User> for IamUser {
    fn from(user: &aws_sdk_iam::types::User) -> Self {
        let arn = user.arn();
        Self {
            user_name: user.user_name().to_string(),
            arn: (!arn.is_empty()).then(|| arn.to_string()),
        }
    }
}

/// A freshly minted access key. The secret exists only in this value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKeyPair {
    /// Public key id
    pub access_key_id: String,
    /// Secret; never logged
    pub secret_access_key: String,
}

impl fmt::Debug for AccessKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeyPair")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_key_debug_hides_secret() {
        let key = AccessKeyPair {
            access_key_id: "AKIA1".to_string(),
            secret_access_key: "s3cr3t".to_string(),
        };
        let rendered = format!("{key:?}");
        assert!(rendered.contains("AKIA1"));
        assert!(!rendered.contains("s3cr3t"));
    }
}
