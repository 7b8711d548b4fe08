//! Error to gRPC status mapping
//!
//! Status messages name the verb and a generic reason. Appliance text stays
//! in the logs.

use std::fmt;

use tonic::Status;

use cosi_common::{Error, ErrorKind};

/// The four provisioner verbs, as named on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// ProvisionerCreateBucket
    CreateBucket,
    /// ProvisionerDeleteBucket
    DeleteBucket,
    /// ProvisionerGrantBucketAccess
    GrantAccess,
    /// ProvisionerRevokeBucketAccess
    RevokeAccess,
}

impl Verb {
    /// RPC method name
    pub fn rpc_name(self) -> &'static str {
        match self {
            Verb::CreateBucket => "ProvisionerCreateBucket",
            Verb::DeleteBucket => "ProvisionerDeleteBucket",
            Verb::GrantAccess => "ProvisionerGrantBucketAccess",
            Verb::RevokeAccess => "ProvisionerRevokeBucketAccess",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rpc_name())
    }
}

/// Map an engine error to the status returned for `verb`
pub fn to_status(verb: Verb, err: &Error) -> Status {
    let rpc = verb.rpc_name();
    match err {
        Error::Canceled { .. } => Status::cancelled(format!("{rpc}: request canceled")),
        Error::Validation { message } => Status::invalid_argument(format!("{rpc}: {message}")),
        Error::Configuration { .. } => Status::internal(format!("{rpc}: operation failed")),
        Error::Appliance {
            operation, kind, ..
        } => match (verb, kind) {
            (Verb::CreateBucket, ErrorKind::AlreadyExists) => {
                Status::already_exists(format!("{rpc}: bucket already exists"))
            }
            (Verb::GrantAccess, ErrorKind::NotFound) if operation == "HeadBucket" => {
                Status::failed_precondition(format!("{rpc}: bucket does not exist"))
            }
            (Verb::GrantAccess, ErrorKind::NotFound) => {
                Status::failed_precondition(format!("{rpc}: precondition not met"))
            }
            (_, ErrorKind::Invalid) => {
                Status::invalid_argument(format!("{rpc}: request rejected as invalid"))
            }
            _ => Status::internal(format!("{rpc}: operation failed")),
        },
        Error::Internal { .. } => Status::internal(format!("{rpc}: operation failed")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn appliance(kind: ErrorKind) -> Error {
        Error::appliance("Op", kind, "SECRET-APPLIANCE-DETAIL")
    }

    #[test]
    fn create_bucket_codes() {
        let code = |e: &Error| to_status(Verb::CreateBucket, e).code();
        assert_eq!(code(&appliance(ErrorKind::AlreadyExists)), Code::AlreadyExists);
        assert_eq!(code(&appliance(ErrorKind::Invalid)), Code::InvalidArgument);
        assert_eq!(code(&appliance(ErrorKind::Transient)), Code::Internal);
        assert_eq!(code(&appliance(ErrorKind::Unauthorized)), Code::Internal);
        assert_eq!(code(&Error::validation("empty name")), Code::InvalidArgument);
        assert_eq!(
            code(&Error::canceled_with_outcome("CreateBucket", Some(true))),
            Code::Cancelled
        );
    }

    #[test]
    fn grant_codes() {
        let code = |e: &Error| to_status(Verb::GrantAccess, e).code();
        assert_eq!(code(&appliance(ErrorKind::NotFound)), Code::FailedPrecondition);
        assert_eq!(code(&appliance(ErrorKind::AlreadyExists)), Code::Internal);
        assert_eq!(code(&appliance(ErrorKind::Invalid)), Code::InvalidArgument);
        assert_eq!(code(&Error::internal("envelope")), Code::Internal);
    }

    #[test]
    fn revoke_and_delete_codes() {
        for verb in [Verb::DeleteBucket, Verb::RevokeAccess] {
            assert_eq!(to_status(verb, &appliance(ErrorKind::Internal)).code(), Code::Internal);
            assert_eq!(to_status(verb, &appliance(ErrorKind::Invalid)).code(), Code::InvalidArgument);
            assert_eq!(to_status(verb, &Error::canceled("x")).code(), Code::Cancelled);
        }
    }

    #[test]
    fn missing_iam_entity_is_not_reported_as_missing_bucket() {
        let bucket = Error::appliance("HeadBucket", ErrorKind::NotFound, "bucket b1 does not exist");
        let status = to_status(Verb::GrantAccess, &bucket);
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert_eq!(status.message(), "ProvisionerGrantBucketAccess: bucket does not exist");

        let policy = Error::appliance("AttachUserPolicy", ErrorKind::NotFound, "NoSuchEntity");
        let status = to_status(Verb::GrantAccess, &policy);
        assert_eq!(status.code(), Code::FailedPrecondition);
        assert_eq!(status.message(), "ProvisionerGrantBucketAccess: precondition not met");
    }

    #[test]
    fn messages_never_carry_appliance_text() {
        for kind in [
            ErrorKind::AlreadyExists,
            ErrorKind::NotFound,
            ErrorKind::Unauthorized,
            ErrorKind::Transient,
            ErrorKind::Invalid,
            ErrorKind::Internal,
        ] {
            for verb in [
                Verb::CreateBucket,
                Verb::DeleteBucket,
                Verb::GrantAccess,
                Verb::RevokeAccess,
            ] {
                let status = to_status(verb, &appliance(kind));
                assert!(!status.message().contains("SECRET-APPLIANCE-DETAIL"));
                assert!(status.message().starts_with(verb.rpc_name()));
            }
        }
    }
}
