//! Principal naming
//!
//! Every principal the provisioner creates is named `cosi-<uuid-v4>`, and the
//! name doubles as the account id handed back to the orchestrator. Revocation
//! therefore needs nothing but the account id to find what to delete.

use uuid::Uuid;

use cosi_common::{Error, Result, PRINCIPAL_PREFIX};

/// Generate a fresh principal name
pub fn generate_username() -> String {
    format!("{PRINCIPAL_PREFIX}{}", Uuid::new_v4())
}

/// Validate an account id returned by a previous grant and return the username.
///
/// Rejects anything that is not `cosi-` followed by a hyphenated UUID, so a
/// revoke can never touch a principal this provisioner did not create.
pub fn parse_account_id(account_id: &str) -> Result<&str> {
    let suffix = account_id.strip_prefix(PRINCIPAL_PREFIX).ok_or_else(|| {
        Error::validation(format!(
            "account id must start with '{PRINCIPAL_PREFIX}'"
        ))
    })?;

    match Uuid::try_parse(suffix) {
        Ok(uuid) if uuid.hyphenated().to_string() == suffix.to_ascii_lowercase() => Ok(account_id),
        _ => Err(Error::validation("account id is not a provisioner-issued id")),
    }
}
