use serde::{Deserialize, Serialize};

use crate::{
    model::entity::{Module, Resource, ResourceCompletion, Submission},
    storage::SignedUrl,
};

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ResourceWithProgress {
    #[serde(flatten)]
    pub resource: Resource,
    pub completion: Option<ResourceCompletion>,
    pub submissions: Vec<Submission>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ModuleResources {
    pub module: Module,
    pub resources: Vec<ResourceWithProgress>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub submission: Submission,
    pub completion: ResourceCompletion,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DownloadResponse {
    #[serde(flatten)]
    pub url: SignedUrl,
    pub file_name: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SubmissionReviewRequest {
    pub submission_status: String,
    pub grade: Option<String>,
    pub review_comments: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ModuleReviewRequest {
    pub approval_status: String,
    pub review_comments: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PendingQuery {
    pub pathway_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PendingQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct SignedFileQuery {
    pub expires: i64,
    pub signature: String,
}
