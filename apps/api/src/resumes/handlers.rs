use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::Resume;
use crate::models::template::RawTemplateId;
use crate::resumes::service::{NewResume, SyncedResume};
use crate::state::AppState;
use crate::usage::DownloadReceipt;

/// Carries the resume's download count on export responses.
const DOWNLOADS_HEADER: &str = "x-resume-downloads";

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct UserIdBody {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateResumeRequest {
    pub user_id: Uuid,
    pub title: Option<String>,
    #[serde(alias = "templateId")]
    pub template_id: RawTemplateId,
    pub content: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct SyncResumeRequest {
    pub user_id: Uuid,
    pub title: Option<String>,
    #[serde(alias = "templateId")]
    pub template_id: Option<RawTemplateId>,
    pub content: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SyncResumeResponse {
    pub success: bool,
    pub resume_id: Uuid,
    pub created: bool,
    pub version: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateResumeRequest {
    pub user_id: Uuid,
    pub title: Option<String>,
    pub content: Value,
}

/// POST /api/v1/resumes
pub async fn handle_create_resume(
    State(state): State<AppState>,
    Json(req): Json<CreateResumeRequest>,
) -> Result<(StatusCode, Json<Resume>), AppError> {
    let new = NewResume {
        title: req.title,
        template_id: req.template_id.canonical()?,
        content: req.content.unwrap_or_else(|| Value::Object(Default::default())),
    };
    let resume = state.resume_service.create(req.user_id, new).await?;
    Ok((StatusCode::CREATED, Json(resume)))
}

/// POST /api/v1/resumes/sync
pub async fn handle_sync_resume(
    State(state): State<AppState>,
    Json(req): Json<SyncResumeRequest>,
) -> Result<Json<SyncResumeResponse>, AppError> {
    let title = req.title.map(|t| t.trim().to_string()).unwrap_or_default();
    let content = req.content.filter(|c| !c.is_null());
    let (Some(template_id), Some(content)) = (req.template_id, content) else {
        return Err(missing_sync_fields());
    };
    if title.is_empty() {
        return Err(missing_sync_fields());
    }

    let synced = SyncedResume {
        title,
        template_id: template_id.canonical()?,
        content,
    };
    let result = state.resume_service.sync(req.user_id, synced).await?;
    Ok(Json(SyncResumeResponse {
        success: true,
        resume_id: result.resume.id,
        created: result.created,
        version: result.resume.version,
    }))
}

fn missing_sync_fields() -> AppError {
    AppError::Validation("Missing required fields: title, templateId, or content".to_string())
}

/// GET /api/v1/resumes
pub async fn handle_list_resumes(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<Resume>>, AppError> {
    Ok(Json(state.resume_service.list(params.user_id).await?))
}

/// GET /api/v1/resumes/:id
pub async fn handle_get_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Resume>, AppError> {
    Ok(Json(state.resume_service.get(params.user_id, id).await?))
}

/// PUT /api/v1/resumes/:id
pub async fn handle_update_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateResumeRequest>,
) -> Result<Json<Resume>, AppError> {
    let resume = state
        .resume_service
        .update(req.user_id, id, req.title, req.content)
        .await?;
    Ok(Json(resume))
}

/// DELETE /api/v1/resumes/:id
pub async fn handle_delete_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<UserIdQuery>,
) -> Result<StatusCode, AppError> {
    state.resume_service.delete(params.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/resumes/:id/download
pub async fn handle_record_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UserIdBody>,
) -> Result<Json<DownloadReceipt>, AppError> {
    Ok(Json(
        state.resume_service.record_download(req.user_id, id).await?,
    ))
}

/// POST /api/v1/resumes/:id/export
pub async fn handle_export_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UserIdBody>,
) -> Result<Response, AppError> {
    let export = state.resume_service.export(req.user_id, id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, export.content_type),
            (header::CONTENT_DISPOSITION, export.disposition),
            (
                HeaderName::from_static(DOWNLOADS_HEADER),
                HeaderValue::from(export.receipt.resume_downloads),
            ),
        ],
        export.artifact.bytes,
    )
        .into_response())
}
