use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::billing::commands::{ReconcileOutcome, SubscriptionCommand};
use crate::errors::AppError;
use crate::models::user::Subscription;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub user_id: Uuid,
    pub plan: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub subscription: Subscription,
}

impl SubscriptionResponse {
    fn from_outcome(user_id: Uuid, outcome: ReconcileOutcome) -> Result<Self, AppError> {
        let subscription = outcome.subscription().cloned().ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("user-addressed command matched no user"))
        })?;
        Ok(Self {
            success: true,
            user_id,
            subscription,
        })
    }
}

/// POST /api/v1/payment/upgrade
pub async fn handle_upgrade(
    State(state): State<AppState>,
    Json(req): Json<UpgradeRequest>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let command = SubscriptionCommand::upgrade(req.user_id, &req.plan)?;
    let outcome = state.reconciler.dispatch(command).await?;
    Ok(Json(SubscriptionResponse::from_outcome(req.user_id, outcome)?))
}

/// POST /api/v1/payment/cancel
pub async fn handle_cancel(
    State(state): State<AppState>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let outcome = state
        .reconciler
        .dispatch(SubscriptionCommand::CancelSubscription {
            user_id: req.user_id,
        })
        .await?;
    Ok(Json(SubscriptionResponse::from_outcome(req.user_id, outcome)?))
}

/// POST /api/v1/webhooks/stripe
///
/// Only a bad signature is reported back. Once verified, the processor
/// always gets an acknowledgement; internal outcomes are logged.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".to_string()))?;
    let event = state
        .webhook_verifier
        .verify_and_parse(&body, signature)
        .map_err(|e| AppError::Validation(format!("Webhook Error: {e}")))?;

    match state.processed_events.first_delivery(&event.id).await {
        Ok(true) => {}
        Ok(false) => {
            info!(event_id = %event.id, "Duplicate webhook delivery acknowledged");
            return Ok(acknowledged());
        }
        Err(e) => warn!(event_id = %event.id, "Event log unavailable, processing anyway: {e}"),
    }

    match event.to_command() {
        Ok(Some(command)) => {
            let kind = command.kind();
            match state.reconciler.dispatch(command).await {
                Ok(ReconcileOutcome::NoMatchingUser) => {
                    warn!(event_id = %event.id, kind, "Webhook event matched no user")
                }
                Ok(_) => info!(event_id = %event.id, kind, "Webhook event applied"),
                Err(e) => {
                    error!(event_id = %event.id, kind, "Webhook event failed: {e}");
                    // Let the processor's redelivery retry the transition.
                    if let Err(e) = state.processed_events.forget(&event.id).await {
                        warn!(event_id = %event.id, "Could not release failed event: {e}");
                    }
                }
            }
        }
        Ok(None) => {}
        Err(e) => warn!(event_id = %event.id, "Webhook event dropped: {e}"),
    }

    Ok(acknowledged())
}

fn acknowledged() -> Json<Value> {
    Json(json!({ "received": true }))
}
