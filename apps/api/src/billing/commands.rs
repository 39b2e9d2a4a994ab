use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plan::Plan;
use crate::models::user::Subscription;

/// How a payment-processor event identifies the user it is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingIdentity {
    Email(String),
    CustomerRef(String),
}

impl BillingIdentity {
    pub fn email(raw: &str) -> Self {
        Self::Email(raw.trim().to_lowercase())
    }
}

impl std::fmt::Display for BillingIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email(email) => write!(f, "email {email}"),
            Self::CustomerRef(reference) => write!(f, "customer {reference}"),
        }
    }
}

/// A state transition for one user's subscription. Every inbound trigger
/// (upgrade request, processor event, cancellation) becomes one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionCommand {
    UpgradePlan {
        user_id: Uuid,
        plan: Plan,
    },
    ConfirmBilling {
        identity: BillingIdentity,
        plan: Plan,
        billing_reference: String,
        period_end: Option<DateTime<Utc>>,
    },
    CancelSubscription {
        user_id: Uuid,
    },
    UpdatePeriod {
        customer_ref: String,
        period_end: DateTime<Utc>,
        cancel_at_period_end: bool,
    },
    EndSubscription {
        customer_ref: String,
    },
}

impl SubscriptionCommand {
    /// Builds an `UpgradePlan` from a raw plan name, rejecting anything the
    /// manual upgrade path cannot grant.
    pub fn upgrade(user_id: Uuid, raw_plan: &str) -> Result<Self, AppError> {
        let plan = raw_plan
            .parse::<Plan>()
            .ok()
            .filter(|p| p.is_manually_upgradable())
            .ok_or_else(|| invalid_upgrade_plan(raw_plan))?;
        Ok(Self::UpgradePlan { user_id, plan })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpgradePlan { .. } => "upgrade_plan",
            Self::ConfirmBilling { .. } => "confirm_billing",
            Self::CancelSubscription { .. } => "cancel_subscription",
            Self::UpdatePeriod { .. } => "update_period",
            Self::EndSubscription { .. } => "end_subscription",
        }
    }
}

pub(crate) fn invalid_upgrade_plan(raw: &str) -> AppError {
    AppError::Validation(format!(
        "Invalid plan '{raw}'. Choose \"premium\" or \"vip\"."
    ))
}

/// What applying a command did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied { subscription: Subscription },
    /// The subscription already held the requested state; nothing was written.
    Unchanged { subscription: Subscription },
    /// A processor event named a user we do not know. Logged and dropped.
    NoMatchingUser,
}

impl ReconcileOutcome {
    pub fn subscription(&self) -> Option<&Subscription> {
        match self {
            Self::Applied { subscription } | Self::Unchanged { subscription } => {
                Some(subscription)
            }
            Self::NoMatchingUser => None,
        }
    }
}
