use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plan::Plan;
use crate::models::user::{Subscription, UsageLedger, User};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub subscription: Subscription,
    /// The plan entitlement checks currently use.
    pub effective_plan: Plan,
    pub usage: UsageLedger,
}

impl From<User> for AccountResponse {
    fn from(user: User) -> Self {
        Self {
            effective_plan: user.subscription.effective_plan(Utc::now()),
            user_id: user.id,
            email: user.email,
            name: user.name,
            subscription: user.subscription,
            usage: user.usage,
        }
    }
}

/// POST /api/v1/users
pub async fn handle_create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let user = User::new(&req.email, &req.name);
    if user.name.is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    if !is_plausible_email(&user.email) {
        return Err(AppError::Validation(format!(
            "'{}' is not a valid email address",
            req.email.trim()
        )));
    }

    state.users.insert_user(&user).await?;
    info!(user_id = %user.id, "User created");
    Ok((StatusCode::CREATED, Json(AccountResponse::from(user))))
}

/// GET /api/v1/users/:id/account
pub async fn handle_get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountResponse>, AppError> {
    let user = state
        .users
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?;
    Ok(Json(AccountResponse::from(user)))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
