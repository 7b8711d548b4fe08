//! gRPC services
//!
//! Serves the Identity and Provisioner services on a unix socket (what the
//! COSI sidecar expects) or TCP. Each verb runs on its own task so that a
//! client cancel or deadline only cancels the request's token; the task keeps
//! running long enough to compensate.

use std::future::Future;
use std::path::Path;

use tokio::net::{TcpListener, UnixListener};
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument};

use cosi_common::{Error, Result};
use cosi_proto::identity_server::{Identity, IdentityServer};
use cosi_proto::provisioner_server::{Provisioner, ProvisionerServer};
use cosi_proto::{
    ProvisionerCreateBucketRequest, ProvisionerCreateBucketResponse,
    ProvisionerDeleteBucketRequest, ProvisionerDeleteBucketResponse, ProvisionerGetInfoRequest,
    ProvisionerGetInfoResponse, ProvisionerGrantBucketAccessRequest,
    ProvisionerGrantBucketAccessResponse, ProvisionerRevokeBucketAccessRequest,
    ProvisionerRevokeBucketAccessResponse,
};

use crate::config::ListenAddr;
use crate::engine::ProvisioningEngine;
use crate::status::{to_status, Verb};

/// Identity service: reports the provisioner name
pub struct IdentityService {
    name: String,
}

impl IdentityService {
    /// Create an identity service reporting `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[tonic::async_trait]
impl Identity for IdentityService {
    async fn provisioner_get_info(
        &self,
        _request: Request<ProvisionerGetInfoRequest>,
    ) -> std::result::Result<Response<ProvisionerGetInfoResponse>, Status> {
        Ok(Response::new(ProvisionerGetInfoResponse {
            name: self.name.clone(),
        }))
    }
}

/// Provisioner service: the four bucket and access verbs
pub struct ProvisionerService {
    engine: ProvisioningEngine,
}

impl ProvisionerService {
    /// Serve verbs through `engine`
    pub fn new(engine: ProvisioningEngine) -> Self {
        Self { engine }
    }

    /// Run a verb on its own task, cancelling its token if this handler is dropped.
    async fn run_cancellable<T, F, Fut>(&self, verb: Verb, work: F) -> std::result::Result<T, Status>
    where
        F: FnOnce(ProvisioningEngine, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let token = CancellationToken::new();
        let _guard = token.clone().drop_guard();

        let task = tokio::spawn(work(self.engine.clone(), token));
        match task.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(to_status(verb, &e)),
            Err(e) => {
                error!(verb = %verb, error = %e, "Verb task failed");
                Err(Status::internal(format!("{verb}: operation failed")))
            }
        }
    }
}

#[tonic::async_trait]
impl Provisioner for ProvisionerService {
    #[instrument(skip_all, fields(bucket = %request.get_ref().name))]
    async fn provisioner_create_bucket(
        &self,
        request: Request<ProvisionerCreateBucketRequest>,
    ) -> std::result::Result<Response<ProvisionerCreateBucketResponse>, Status> {
        let req = request.into_inner();
        let bucket_id = self
            .run_cancellable(Verb::CreateBucket, move |engine, cancel| async move {
                engine
                    .create_bucket(&req.name, req.protocol.as_ref(), &cancel)
                    .await
            })
            .await?;

        Ok(Response::new(ProvisionerCreateBucketResponse { bucket_id }))
    }

    #[instrument(skip_all, fields(bucket = %request.get_ref().bucket_id))]
    async fn provisioner_delete_bucket(
        &self,
        request: Request<ProvisionerDeleteBucketRequest>,
    ) -> std::result::Result<Response<ProvisionerDeleteBucketResponse>, Status> {
        let req = request.into_inner();
        self.run_cancellable(Verb::DeleteBucket, move |engine, cancel| async move {
            engine.delete_bucket(&req.bucket_id, &cancel).await
        })
        .await?;

        Ok(Response::new(ProvisionerDeleteBucketResponse {}))
    }

    #[instrument(skip_all, fields(bucket = %request.get_ref().bucket_id))]
    async fn provisioner_grant_bucket_access(
        &self,
        request: Request<ProvisionerGrantBucketAccessRequest>,
    ) -> std::result::Result<Response<ProvisionerGrantBucketAccessResponse>, Status> {
        let req = request.into_inner();
        let authentication_type = req.authentication_type();
        let grant = self
            .run_cancellable(Verb::GrantAccess, move |engine, cancel| async move {
                engine
                    .grant_access(&req.bucket_id, &req.account_name, authentication_type, &cancel)
                    .await
            })
            .await?;

        Ok(Response::new(ProvisionerGrantBucketAccessResponse {
            account_id: grant.account_id,
            credentials: grant.credentials,
        }))
    }

    #[instrument(skip_all, fields(bucket = %request.get_ref().bucket_id))]
    async fn provisioner_revoke_bucket_access(
        &self,
        request: Request<ProvisionerRevokeBucketAccessRequest>,
    ) -> std::result::Result<Response<ProvisionerRevokeBucketAccessResponse>, Status> {
        let req = request.into_inner();
        self.run_cancellable(Verb::RevokeAccess, move |engine, cancel| async move {
            engine
                .revoke_access(&req.bucket_id, &req.account_id, &cancel)
                .await
        })
        .await?;

        Ok(Response::new(ProvisionerRevokeBucketAccessResponse {}))
    }
}

/// Both services, ready to serve
pub fn router(engine: ProvisioningEngine, provisioner_name: &str) -> Router {
    Server::builder()
        .add_service(IdentityServer::new(IdentityService::new(provisioner_name)))
        .add_service(ProvisionerServer::new(ProvisionerService::new(engine)))
}

/// Bind `listen` and serve until `shutdown` resolves
pub async fn serve<S>(
    listen: &ListenAddr,
    engine: ProvisioningEngine,
    provisioner_name: &str,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()> + Send,
{
    let router = router(engine, provisioner_name);
    info!(listen = %listen, name = %provisioner_name, "Starting COSI provisioner gRPC server");

    match listen {
        ListenAddr::Tcp(addr) => {
            let listener = TcpListener::bind(addr.as_str())
                .await
                .map_err(|e| Error::internal_with_context("server", format!("bind {addr}: {e}")))?;
            router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
                .await
                .map_err(|e| Error::internal_with_context("server", e.to_string()))
        }
        ListenAddr::Unix(path) => {
            let listener = bind_unix(path)?;
            let result = router
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), shutdown)
                .await
                .map_err(|e| Error::internal_with_context("server", e.to_string()));
            if let Err(e) = std::fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "Socket already removed");
            }
            result
        }
    }
}

/// Bind a unix socket, replacing a stale one left by a previous run.
fn bind_unix(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::internal_with_context("server", format!("create {}: {e}", parent.display()))
        })?;
    }
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "Removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(Error::internal_with_context(
                "server",
                format!("remove stale socket {}: {e}", path.display()),
            ))
        }
    }
    UnixListener::bind(path).map_err(|e| {
        Error::internal_with_context("server", format!("bind {}: {e}", path.display()))
    })
}
