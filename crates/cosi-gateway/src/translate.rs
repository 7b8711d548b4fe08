//! Translation of SDK failures into the provisioner's error taxonomy
//!
//! S3 and IAM operations both fail with the same smithy `SdkError` shape, so
//! one function covers every call either gateway makes.

use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;

use cosi_common::{classify, Error, ErrorKind};

/// Convert an SDK error from `operation` into an [`Error::Appliance`].
///
/// Timeouts and dispatch failures never reached the appliance and are
/// transient. Request-construction failures are bugs on our side. Service and
/// response errors go through [`classify`] with the error code and HTTP
/// status the appliance returned.
pub fn translate<E>(operation: &str, err: SdkError<E, HttpResponse>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            Error::appliance(operation, ErrorKind::Transient, message)
        }
        SdkError::ConstructionFailure(_) => {
            Error::appliance(operation, ErrorKind::Internal, message)
        }
        _ => {
            let code = err
                .as_service_error()
                .and_then(|e| e.code())
                .map(str::to_string);
            let status = err.raw_response().map(|r| r.status().as_u16());
            let kind = classify(code.as_deref(), status, &message);
            Error::Appliance {
                operation: operation.to_string(),
                kind,
                code,
                message,
            }
        }
    }
}

/// Map NotFound to success, for cleanup calls where absence is the goal.
pub fn tolerate_not_found(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
