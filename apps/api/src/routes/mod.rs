pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::billing::handlers as billing;
use crate::resumes::handlers as resumes;
use crate::state::AppState;
use crate::templates::handlers as templates;
use crate::users::handlers as users;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Accounts
        .route("/api/v1/users", post(users::handle_create_user))
        .route("/api/v1/users/:id/account", get(users::handle_get_account))
        // Subscription transitions
        .route("/api/v1/payment/upgrade", post(billing::handle_upgrade))
        .route("/api/v1/payment/cancel", post(billing::handle_cancel))
        .route(
            "/api/v1/webhooks/stripe",
            post(billing::handle_stripe_webhook),
        )
        // Template catalog
        .route("/api/v1/templates", get(templates::handle_list_templates))
        .route("/api/v1/templates/:id", get(templates::handle_get_template))
        // Resumes
        .route(
            "/api/v1/resumes",
            get(resumes::handle_list_resumes).post(resumes::handle_create_resume),
        )
        .route("/api/v1/resumes/sync", post(resumes::handle_sync_resume))
        .route(
            "/api/v1/resumes/:id",
            get(resumes::handle_get_resume)
                .put(resumes::handle_update_resume)
                .delete(resumes::handle_delete_resume),
        )
        .route(
            "/api/v1/resumes/:id/download",
            post(resumes::handle_record_download),
        )
        .route(
            "/api/v1/resumes/:id/export",
            post(resumes::handle_export_resume),
        )
        .with_state(state)
}
