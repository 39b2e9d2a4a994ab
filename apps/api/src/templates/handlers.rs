use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::entitlement::can_access;
use crate::errors::AppError;
use crate::models::template::{Template, TemplateId};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CatalogQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TemplateView {
    #[serde(flatten)]
    pub template: Template,
    /// Present when the catalog was requested for a specific user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessible: Option<bool>,
}

/// GET /api/v1/templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
    Query(params): Query<CatalogQuery>,
) -> Result<Json<Vec<TemplateView>>, AppError> {
    let plan = match params.user_id {
        Some(user_id) => {
            let user = state
                .users
                .find_user(user_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;
            Some(user.subscription.effective_plan(Utc::now()))
        }
        None => None,
    };

    let templates = state.templates.list_templates().await?;
    let views = templates
        .into_iter()
        .map(|template| TemplateView {
            accessible: plan.map(|p| can_access(p, template.category)),
            template,
        })
        .collect();
    Ok(Json(views))
}

/// GET /api/v1/templates/:id
pub async fn handle_get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Template>, AppError> {
    let id = TemplateId::normalize(&id)?;
    let template = state
        .templates
        .find_template(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Template {id} not found")))?;
    Ok(Json(template))
}
