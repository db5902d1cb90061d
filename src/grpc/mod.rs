//! gRPC transport: the tonic-generated `Registry` service trait implemented
//! against a [`RegistryService`], plus the server bootstrap (health check +
//! reflection + gzip, following the teacher's `start_grpc_server` shape).

use std::net::SocketAddr;
use std::sync::Arc;

use tonic::codec::CompressionEncoding;
use tonic::transport::{Error, Server};
use tonic::{Request, Response, Status};
use tracing::Instrument;

use crate::error::RegistryError;
use crate::proto;
use crate::proto::registry_server::{Registry, RegistryServer};
use crate::service::RegistryService;

/// Wraps one RPC body in a span carrying the method and target resource
/// name, logging `debug` on success and `warn` with the error on failure
/// (SPEC_FULL.md §7, "Logging").
async fn traced<T, F>(method: &'static str, resource: &str, fut: F) -> Result<T, RegistryError>
where
    F: std::future::Future<Output = Result<T, RegistryError>>,
{
    let span = tracing::info_span!("grpc_request", method, resource);
    async move {
        match fut.await {
            Ok(value) => {
                tracing::debug!("request succeeded");
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "request failed");
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}

pub struct RegistryGrpcApi {
    service: Arc<RegistryService>,
}

impl RegistryGrpcApi {
    pub fn new(service: Arc<RegistryService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl Registry for RegistryGrpcApi {
    // -- Project ---------------------------------------------------------

    async fn create_project(
        &self,
        request: Request<proto::CreateProjectRequest>,
    ) -> Result<Response<proto::Project>, Status> {
        let req = request.into_inner();
        let body = req.project.unwrap_or_default();
        let record = traced(
            "CreateProject",
            &req.project_id,
            self.service
                .create_project(&req.project_id, body.display_name, body.description),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn get_project(
        &self,
        request: Request<proto::GetProjectRequest>,
    ) -> Result<Response<proto::Project>, Status> {
        let req = request.into_inner();
        let record = traced("GetProject", &req.name, self.service.get_project(&req.name)).await?;
        Ok(Response::new(record.into()))
    }

    async fn list_projects(
        &self,
        request: Request<proto::ListProjectsRequest>,
    ) -> Result<Response<proto::ListProjectsResponse>, Status> {
        let req = request.into_inner();
        let (records, next_page_token) = traced(
            "ListProjects",
            "projects",
            self.service
                .list_projects(req.page_size, &req.page_token, &req.filter),
        )
        .await?;
        Ok(Response::new(proto::ListProjectsResponse {
            projects: records.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn update_project(
        &self,
        request: Request<proto::UpdateProjectRequest>,
    ) -> Result<Response<proto::Project>, Status> {
        let req = request.into_inner();
        let body = req.project.unwrap_or_default();
        let record = traced(
            "UpdateProject",
            &body.name,
            self.service.update_project(
                &body.name,
                body.display_name,
                body.description,
                &req.update_mask,
                req.allow_missing,
            ),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn delete_project(
        &self,
        request: Request<proto::DeleteProjectRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        traced("DeleteProject", &req.name, self.service.delete_project(&req.name)).await?;
        Ok(Response::new(proto::Empty {}))
    }

    // -- Api ---------------------------------------------------------------

    async fn create_api(
        &self,
        request: Request<proto::CreateApiRequest>,
    ) -> Result<Response<proto::Api>, Status> {
        let req = request.into_inner();
        let body = req.api.unwrap_or_default();
        let record = traced(
            "CreateApi",
            &req.parent,
            self.service
                .create_api(&req.parent, &req.api_id, body.display_name, body.description),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn get_api(
        &self,
        request: Request<proto::GetApiRequest>,
    ) -> Result<Response<proto::Api>, Status> {
        let req = request.into_inner();
        let record = traced("GetApi", &req.name, self.service.get_api(&req.name)).await?;
        Ok(Response::new(record.into()))
    }

    async fn list_apis(
        &self,
        request: Request<proto::ListApisRequest>,
    ) -> Result<Response<proto::ListApisResponse>, Status> {
        let req = request.into_inner();
        let (records, next_page_token) = traced(
            "ListApis",
            &req.parent,
            self.service
                .list_apis(&req.parent, req.page_size, &req.page_token, &req.filter),
        )
        .await?;
        Ok(Response::new(proto::ListApisResponse {
            apis: records.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn update_api(
        &self,
        request: Request<proto::UpdateApiRequest>,
    ) -> Result<Response<proto::Api>, Status> {
        let req = request.into_inner();
        let body = req.api.unwrap_or_default();
        let record = traced(
            "UpdateApi",
            &body.name,
            self.service.update_api(
                &body.name,
                body.display_name,
                body.description,
                &req.update_mask,
                req.allow_missing,
            ),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn delete_api(
        &self,
        request: Request<proto::DeleteApiRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        traced("DeleteApi", &req.name, self.service.delete_api(&req.name)).await?;
        Ok(Response::new(proto::Empty {}))
    }

    // -- ApiVersion ----------------------------------------------------------

    async fn create_api_version(
        &self,
        request: Request<proto::CreateApiVersionRequest>,
    ) -> Result<Response<proto::ApiVersion>, Status> {
        let req = request.into_inner();
        let body = req.api_version.unwrap_or_default();
        let record = traced(
            "CreateApiVersion",
            &req.parent,
            self.service.create_api_version(
                &req.parent,
                &req.api_version_id,
                body.display_name,
                body.description,
            ),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn get_api_version(
        &self,
        request: Request<proto::GetApiVersionRequest>,
    ) -> Result<Response<proto::ApiVersion>, Status> {
        let req = request.into_inner();
        let record = traced(
            "GetApiVersion",
            &req.name,
            self.service.get_api_version(&req.name),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn list_api_versions(
        &self,
        request: Request<proto::ListApiVersionsRequest>,
    ) -> Result<Response<proto::ListApiVersionsResponse>, Status> {
        let req = request.into_inner();
        let (records, next_page_token) = traced(
            "ListApiVersions",
            &req.parent,
            self.service
                .list_api_versions(&req.parent, req.page_size, &req.page_token, &req.filter),
        )
        .await?;
        Ok(Response::new(proto::ListApiVersionsResponse {
            api_versions: records.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn update_api_version(
        &self,
        request: Request<proto::UpdateApiVersionRequest>,
    ) -> Result<Response<proto::ApiVersion>, Status> {
        let req = request.into_inner();
        let body = req.api_version.unwrap_or_default();
        let record = traced(
            "UpdateApiVersion",
            &body.name,
            self.service.update_api_version(
                &body.name,
                body.display_name,
                body.description,
                &req.update_mask,
                req.allow_missing,
            ),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn delete_api_version(
        &self,
        request: Request<proto::DeleteApiVersionRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        traced(
            "DeleteApiVersion",
            &req.name,
            self.service.delete_api_version(&req.name),
        )
        .await?;
        Ok(Response::new(proto::Empty {}))
    }

    // -- ApiSpec -------------------------------------------------------------

    async fn create_api_spec(
        &self,
        request: Request<proto::CreateApiSpecRequest>,
    ) -> Result<Response<proto::ApiSpec>, Status> {
        let req = request.into_inner();
        let body = req.api_spec.unwrap_or_default();
        let record = traced(
            "CreateApiSpec",
            &req.parent,
            self.service.create_api_spec(
                &req.parent,
                &req.api_spec_id,
                body.filename,
                body.description,
                body.mime_type,
                body.source_uri,
                body.contents,
            ),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn get_api_spec(
        &self,
        request: Request<proto::GetApiSpecRequest>,
    ) -> Result<Response<proto::ApiSpec>, Status> {
        let req = request.into_inner();
        let record = traced("GetApiSpec", &req.name, self.service.get_api_spec(&req.name)).await?;
        Ok(Response::new(record.into()))
    }

    async fn list_api_specs(
        &self,
        request: Request<proto::ListApiSpecsRequest>,
    ) -> Result<Response<proto::ListApiSpecsResponse>, Status> {
        let req = request.into_inner();
        let (records, next_page_token) = traced(
            "ListApiSpecs",
            &req.parent,
            self.service
                .list_api_specs(&req.parent, req.page_size, &req.page_token, &req.filter),
        )
        .await?;
        Ok(Response::new(proto::ListApiSpecsResponse {
            api_specs: records.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn update_api_spec(
        &self,
        request: Request<proto::UpdateApiSpecRequest>,
    ) -> Result<Response<proto::ApiSpec>, Status> {
        let req = request.into_inner();
        let body = req.api_spec.unwrap_or_default();
        let record = traced(
            "UpdateApiSpec",
            &body.name,
            self.service.update_api_spec(
                &body.name,
                body.filename,
                body.description,
                body.mime_type,
                body.source_uri,
                Some(body.contents),
                &req.update_mask,
                req.allow_missing,
            ),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn delete_api_spec(
        &self,
        request: Request<proto::DeleteApiSpecRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        traced("DeleteApiSpec", &req.name, self.service.delete_api_spec(&req.name)).await?;
        Ok(Response::new(proto::Empty {}))
    }

    async fn list_api_spec_revisions(
        &self,
        request: Request<proto::ListApiSpecRevisionsRequest>,
    ) -> Result<Response<proto::ListApiSpecRevisionsResponse>, Status> {
        let req = request.into_inner();
        let (records, next_page_token) = traced(
            "ListApiSpecRevisions",
            &req.name,
            self.service
                .list_api_spec_revisions(&req.name, req.page_size, &req.page_token),
        )
        .await?;
        Ok(Response::new(proto::ListApiSpecRevisionsResponse {
            api_specs: records.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn tag_api_spec_revision(
        &self,
        request: Request<proto::TagApiSpecRevisionRequest>,
    ) -> Result<Response<proto::ApiSpec>, Status> {
        let req = request.into_inner();
        let record = traced(
            "TagApiSpecRevision",
            &req.name,
            self.service.tag_api_spec_revision(&req.name, &req.tag),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn rollback_api_spec(
        &self,
        request: Request<proto::RollbackApiSpecRequest>,
    ) -> Result<Response<proto::ApiSpec>, Status> {
        let req = request.into_inner();
        let record = traced(
            "RollbackApiSpec",
            &req.name,
            self.service.rollback_api_spec(&req.name, &req.revision_id),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn delete_api_spec_revision(
        &self,
        request: Request<proto::DeleteApiSpecRevisionRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        traced(
            "DeleteApiSpecRevision",
            &req.name,
            self.service.delete_api_spec_revision(&req.name),
        )
        .await?;
        Ok(Response::new(proto::Empty {}))
    }

    // -- ApiDeployment ---------------------------------------------------------

    async fn create_api_deployment(
        &self,
        request: Request<proto::CreateApiDeploymentRequest>,
    ) -> Result<Response<proto::ApiDeployment>, Status> {
        let req = request.into_inner();
        let body = req.api_deployment.unwrap_or_default();
        let record = traced(
            "CreateApiDeployment",
            &req.parent,
            self.service.create_api_deployment(
                &req.parent,
                &req.api_deployment_id,
                body.display_name,
                body.description,
                body.api_spec_revision,
                body.endpoint_uri,
                body.external_channel_uri,
                body.intended_audience,
                body.access_guidance,
            ),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn get_api_deployment(
        &self,
        request: Request<proto::GetApiDeploymentRequest>,
    ) -> Result<Response<proto::ApiDeployment>, Status> {
        let req = request.into_inner();
        let record = traced(
            "GetApiDeployment",
            &req.name,
            self.service.get_api_deployment(&req.name),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn list_api_deployments(
        &self,
        request: Request<proto::ListApiDeploymentsRequest>,
    ) -> Result<Response<proto::ListApiDeploymentsResponse>, Status> {
        let req = request.into_inner();
        let (records, next_page_token) = traced(
            "ListApiDeployments",
            &req.parent,
            self.service.list_api_deployments(
                &req.parent,
                req.page_size,
                &req.page_token,
                &req.filter,
            ),
        )
        .await?;
        Ok(Response::new(proto::ListApiDeploymentsResponse {
            api_deployments: records.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn update_api_deployment(
        &self,
        request: Request<proto::UpdateApiDeploymentRequest>,
    ) -> Result<Response<proto::ApiDeployment>, Status> {
        let req = request.into_inner();
        let body = req.api_deployment.unwrap_or_default();
        let record = traced(
            "UpdateApiDeployment",
            &body.name,
            self.service.update_api_deployment(
                &body.name,
                body.display_name,
                body.description,
                body.api_spec_revision,
                body.endpoint_uri,
                body.external_channel_uri,
                body.intended_audience,
                body.access_guidance,
                &req.update_mask,
                req.allow_missing,
            ),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn delete_api_deployment(
        &self,
        request: Request<proto::DeleteApiDeploymentRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        traced(
            "DeleteApiDeployment",
            &req.name,
            self.service.delete_api_deployment(&req.name),
        )
        .await?;
        Ok(Response::new(proto::Empty {}))
    }

    async fn list_api_deployment_revisions(
        &self,
        request: Request<proto::ListApiDeploymentRevisionsRequest>,
    ) -> Result<Response<proto::ListApiDeploymentRevisionsResponse>, Status> {
        let req = request.into_inner();
        let (records, next_page_token) = traced(
            "ListApiDeploymentRevisions",
            &req.name,
            self.service
                .list_api_deployment_revisions(&req.name, req.page_size, &req.page_token),
        )
        .await?;
        Ok(Response::new(proto::ListApiDeploymentRevisionsResponse {
            api_deployments: records.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn tag_api_deployment_revision(
        &self,
        request: Request<proto::TagApiDeploymentRevisionRequest>,
    ) -> Result<Response<proto::ApiDeployment>, Status> {
        let req = request.into_inner();
        let record = traced(
            "TagApiDeploymentRevision",
            &req.name,
            self.service.tag_api_deployment_revision(&req.name, &req.tag),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn rollback_api_deployment(
        &self,
        request: Request<proto::RollbackApiDeploymentRequest>,
    ) -> Result<Response<proto::ApiDeployment>, Status> {
        let req = request.into_inner();
        let record = traced(
            "RollbackApiDeployment",
            &req.name,
            self.service
                .rollback_api_deployment(&req.name, &req.revision_id),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn delete_api_deployment_revision(
        &self,
        request: Request<proto::DeleteApiDeploymentRevisionRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        traced(
            "DeleteApiDeploymentRevision",
            &req.name,
            self.service.delete_api_deployment_revision(&req.name),
        )
        .await?;
        Ok(Response::new(proto::Empty {}))
    }

    // -- Artifact ------------------------------------------------------------

    async fn create_artifact(
        &self,
        request: Request<proto::CreateArtifactRequest>,
    ) -> Result<Response<proto::Artifact>, Status> {
        let req = request.into_inner();
        let body = req.artifact.unwrap_or_default();
        let record = traced(
            "CreateArtifact",
            &req.parent,
            self.service
                .create_artifact(&req.parent, &req.artifact_id, body.mime_type, body.contents),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn get_artifact(
        &self,
        request: Request<proto::GetArtifactRequest>,
    ) -> Result<Response<proto::Artifact>, Status> {
        let req = request.into_inner();
        let record = traced("GetArtifact", &req.name, self.service.get_artifact(&req.name)).await?;
        Ok(Response::new(record.into()))
    }

    async fn get_artifact_contents(
        &self,
        request: Request<proto::GetArtifactContentsRequest>,
    ) -> Result<Response<proto::ArtifactContents>, Status> {
        let req = request.into_inner();
        let record = traced(
            "GetArtifactContents",
            &req.name,
            self.service.get_artifact(&req.name),
        )
        .await?;
        Ok(Response::new(proto::ArtifactContents {
            mime_type: record.mime_type,
            data: record.contents,
        }))
    }

    async fn list_artifacts(
        &self,
        request: Request<proto::ListArtifactsRequest>,
    ) -> Result<Response<proto::ListArtifactsResponse>, Status> {
        let req = request.into_inner();
        let (records, next_page_token) = traced(
            "ListArtifacts",
            &req.parent,
            self.service
                .list_artifacts(&req.parent, req.page_size, &req.page_token, &req.filter),
        )
        .await?;
        Ok(Response::new(proto::ListArtifactsResponse {
            artifacts: records.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn replace_artifact(
        &self,
        request: Request<proto::ReplaceArtifactRequest>,
    ) -> Result<Response<proto::Artifact>, Status> {
        let req = request.into_inner();
        let body = req.artifact.unwrap_or_default();
        let record = traced(
            "ReplaceArtifact",
            &body.name,
            self.service
                .update_artifact(&body.name, body.mime_type, Some(body.contents), &[]),
        )
        .await?;
        Ok(Response::new(record.into()))
    }

    async fn delete_artifact(
        &self,
        request: Request<proto::DeleteArtifactRequest>,
    ) -> Result<Response<proto::Empty>, Status> {
        let req = request.into_inner();
        traced("DeleteArtifact", &req.name, self.service.delete_artifact(&req.name)).await?;
        Ok(Response::new(proto::Empty {}))
    }
}

/// Starts the gRPC listener with health checking, server reflection, and
/// gzip compression on the `Registry` service (following the teacher's
/// `start_grpc_server` shape).
pub async fn start_grpc_server(addr: SocketAddr, service: Arc<RegistryService>) -> Result<(), Error> {
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<RegistryServer<RegistryGrpcApi>>()
        .await;

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .expect("reflection service descriptor is valid");

    Server::builder()
        .add_service(reflection_service)
        .add_service(health_service)
        .add_service(
            RegistryServer::new(RegistryGrpcApi::new(service))
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip),
        )
        .serve(addr)
        .await
}
