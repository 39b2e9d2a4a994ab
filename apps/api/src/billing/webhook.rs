//! Stripe webhook verification and translation into subscription commands.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::billing::commands::{BillingIdentity, SubscriptionCommand};
use crate::models::plan::Plan;

/// Plan granted by a checkout that carries no `metadata.plan`.
const DEFAULT_CHECKOUT_PLAN: Plan = Plan::Premium;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Malformed signature header: {0}")]
    MalformedSignature(&'static str),

    #[error("Signature verification failed")]
    SignatureMismatch,

    #[error("Signature timestamp outside tolerance")]
    StaleTimestamp,

    #[error("Invalid event payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    CheckoutSessionCompleted,
    CustomerSubscriptionUpdated,
    CustomerSubscriptionDeleted,
    Other(String),
}

impl From<&str> for WebhookEventType {
    fn from(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.updated" => Self::CustomerSubscriptionUpdated,
            "customer.subscription.deleted" => Self::CustomerSubscriptionDeleted,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A verified event. `object` is the raw `data.object` payload.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: WebhookEventType,
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// The subscription command this event asks for, or `None` for event
    /// types that do not touch subscriptions.
    pub fn to_command(&self) -> Result<Option<SubscriptionCommand>, WebhookError> {
        match &self.event_type {
            WebhookEventType::CheckoutSessionCompleted => {
                let session: CheckoutSession = parse_object(&self.object)?;
                checkout_command(session).map(Some)
            }
            WebhookEventType::CustomerSubscriptionUpdated => {
                let sub: ProcessorSubscription = parse_object(&self.object)?;
                let period_end = sub.current_period_end.ok_or_else(|| {
                    WebhookError::Payload("subscription has no current_period_end".to_string())
                })?;
                Ok(Some(SubscriptionCommand::UpdatePeriod {
                    customer_ref: sub.customer.into_id(),
                    period_end: from_unix(period_end)?,
                    cancel_at_period_end: sub.cancel_at_period_end,
                }))
            }
            WebhookEventType::CustomerSubscriptionDeleted => {
                let sub: ProcessorSubscription = parse_object(&self.object)?;
                Ok(Some(SubscriptionCommand::EndSubscription {
                    customer_ref: sub.customer.into_id(),
                }))
            }
            WebhookEventType::Other(kind) => {
                debug!(event_id = %self.id, kind = %kind, "Ignoring webhook event type");
                Ok(None)
            }
        }
    }
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, WebhookError> {
        self.verify_at(payload, signature, Utc::now().timestamp())?;

        let raw: RawEvent = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::Payload(e.to_string()))?;
        info!(event_id = %raw.id, event_type = %raw.event_type, "Verified webhook event");

        Ok(WebhookEvent {
            id: raw.id,
            event_type: WebhookEventType::from(raw.event_type.as_str()),
            object: raw.data.object,
        })
    }

    /// Checks a `t=<unix>,v1=<hex>` header. Any of several `v1` entries may
    /// match (the processor sends one per active secret).
    fn verify_at(&self, payload: &[u8], signature: &str, now: i64) -> Result<(), WebhookError> {
        let mut timestamp: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();
        for part in signature.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => candidates.push(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::MalformedSignature("missing timestamp"))?;
        if candidates.is_empty() {
            return Err(WebhookError::MalformedSignature("missing v1 signature"));
        }

        let matched = candidates.iter().any(|candidate| {
            let Ok(expected) = hex::decode(candidate) else {
                return false;
            };
            let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()) else {
                return false;
            };
            mac.update(timestamp.as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.verify_slice(&expected).is_ok()
        });
        if !matched {
            warn!("Webhook signature verification failed");
            return Err(WebhookError::SignatureMismatch);
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| WebhookError::MalformedSignature("timestamp is not a number"))?;
        if now.abs_diff(ts) > self.tolerance_secs.unsigned_abs() {
            warn!(timestamp = ts, now, "Webhook timestamp outside tolerance");
            return Err(WebhookError::StaleTimestamp);
        }
        Ok(())
    }
}

fn checkout_command(session: CheckoutSession) -> Result<SubscriptionCommand, WebhookError> {
    let plan = match session.metadata.plan.as_deref() {
        Some(raw) => raw
            .parse::<Plan>()
            .map_err(|e| WebhookError::Payload(e.to_string()))?,
        None => DEFAULT_CHECKOUT_PLAN,
    };

    let customer = session.customer.map(Customer::into_id);
    let email = session
        .customer_details
        .and_then(|d| d.email)
        .or(session.customer_email);

    let identity = match (email, &customer) {
        (Some(email), _) => BillingIdentity::email(&email),
        (None, Some(customer)) => BillingIdentity::CustomerRef(customer.clone()),
        (None, None) => {
            return Err(WebhookError::Payload(
                "checkout session names neither an email nor a customer".to_string(),
            ))
        }
    };

    Ok(SubscriptionCommand::ConfirmBilling {
        identity,
        plan,
        billing_reference: customer.unwrap_or(session.id),
        period_end: None,
    })
}

fn parse_object<T: for<'de> Deserialize<'de>>(object: &serde_json::Value) -> Result<T, WebhookError> {
    T::deserialize(object).map_err(|e| WebhookError::Payload(e.to_string()))
}

fn from_unix(ts: i64) -> Result<DateTime<Utc>, WebhookError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| WebhookError::Payload(format!("invalid timestamp {ts}")))
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

/// `customer` arrives either as an id or as an expanded object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Customer {
    Id(String),
    Expanded { id: String },
}

impl Customer {
    fn into_id(self) -> String {
        match self {
            Self::Id(id) | Self::Expanded { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    customer: Option<Customer>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
    #[serde(default)]
    metadata: CheckoutMetadata,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckoutMetadata {
    plan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessorSubscription {
    customer: Customer,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
}
