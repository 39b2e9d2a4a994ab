//! Subscription reconciler, the single writer of `User::subscription`.
//!
//! Each command runs as lock → read → transition → atomic write under the
//! user's entry in `UserLocks`. Processor events resolve the user *before*
//! taking the lock; identity misses become `NoMatchingUser` and are never
//! surfaced as errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::billing::commands::{
    invalid_upgrade_plan, BillingIdentity, ReconcileOutcome, SubscriptionCommand,
};
use crate::errors::AppError;
use crate::models::plan::Plan;
use crate::models::user::{Subscription, User};
use crate::store::{update_user, UserLocks, UserStore};

#[derive(Clone)]
pub struct Reconciler {
    users: Arc<dyn UserStore>,
    locks: Arc<UserLocks>,
}

impl Reconciler {
    pub fn new(users: Arc<dyn UserStore>, locks: Arc<UserLocks>) -> Self {
        Self { users, locks }
    }

    pub async fn dispatch(
        &self,
        command: SubscriptionCommand,
    ) -> Result<ReconcileOutcome, AppError> {
        match command {
            SubscriptionCommand::UpgradePlan { user_id, plan } => {
                self.apply_manual_upgrade(user_id, plan).await
            }
            SubscriptionCommand::ConfirmBilling {
                identity,
                plan,
                billing_reference,
                period_end,
            } => {
                self.apply_billing_confirmation(&identity, plan, &billing_reference, period_end)
                    .await
            }
            SubscriptionCommand::CancelSubscription { user_id } => {
                self.apply_cancellation(user_id).await
            }
            SubscriptionCommand::UpdatePeriod {
                customer_ref,
                period_end,
                cancel_at_period_end,
            } => {
                self.apply_period_update(&customer_ref, period_end, cancel_at_period_end)
                    .await
            }
            SubscriptionCommand::EndSubscription { customer_ref } => {
                self.apply_subscription_ended(&customer_ref).await
            }
        }
    }

    /// Administrative fast path: grants the plan without a billing
    /// reference. Status and billing reference are left as they are.
    #[instrument(skip(self))]
    pub async fn apply_manual_upgrade(
        &self,
        user_id: Uuid,
        plan: Plan,
    ) -> Result<ReconcileOutcome, AppError> {
        if !plan.is_manually_upgradable() {
            return Err(invalid_upgrade_plan(plan.as_str()));
        }
        let update = update_user(self.users.as_ref(), &self.locks, user_id, |user| {
            user.subscription.upgrade_manually(plan);
            Ok(())
        })
        .await?;

        info!(%user_id, %plan, "Manual plan upgrade applied");
        Ok(outcome(update.user.subscription, update.written))
    }

    /// Applying the same confirmation twice leaves the same state and
    /// issues no second write.
    #[instrument(skip(self))]
    pub async fn apply_billing_confirmation(
        &self,
        identity: &BillingIdentity,
        plan: Plan,
        billing_reference: &str,
        period_end: Option<DateTime<Utc>>,
    ) -> Result<ReconcileOutcome, AppError> {
        if plan == Plan::Free {
            return Err(AppError::Validation(
                "A billing confirmation must name a paid plan".to_string(),
            ));
        }
        let Some(user) = self.resolve(identity).await? else {
            warn!(%identity, billing_reference, "Billing confirmation matched no user, dropping");
            return Ok(ReconcileOutcome::NoMatchingUser);
        };

        let update = update_user(self.users.as_ref(), &self.locks, user.id, |user| {
            user.subscription
                .confirm_billing(plan, billing_reference, period_end);
            Ok(())
        })
        .await?;

        if update.written {
            info!(user_id = %user.id, %plan, billing_reference, "Billing confirmation applied");
        } else {
            info!(user_id = %user.id, billing_reference, "Billing confirmation already applied");
        }
        Ok(outcome(update.user.subscription, update.written))
    }

    /// Marks the subscription for cancellation at period end. The plan stays
    /// in force until the processor reports the period over.
    #[instrument(skip(self))]
    pub async fn apply_cancellation(&self, user_id: Uuid) -> Result<ReconcileOutcome, AppError> {
        let update = update_user(self.users.as_ref(), &self.locks, user_id, |user| {
            if user.subscription.cancel_at_period_end {
                return Ok(());
            }
            if user.subscription.request_cancellation() {
                Ok(())
            } else {
                Err(AppError::Validation(
                    "There is no paid subscription to cancel".to_string(),
                ))
            }
        })
        .await?;

        info!(%user_id, "Cancellation pending until period end");
        Ok(outcome(update.user.subscription, update.written))
    }

    #[instrument(skip(self))]
    pub async fn apply_period_update(
        &self,
        customer_ref: &str,
        period_end: DateTime<Utc>,
        cancel_at_period_end: bool,
    ) -> Result<ReconcileOutcome, AppError> {
        let identity = BillingIdentity::CustomerRef(customer_ref.to_string());
        let Some(user) = self.resolve(&identity).await? else {
            warn!(customer_ref, "Period update matched no user, dropping");
            return Ok(ReconcileOutcome::NoMatchingUser);
        };

        let update = update_user(self.users.as_ref(), &self.locks, user.id, |user| {
            user.subscription
                .update_period(period_end, cancel_at_period_end);
            Ok(())
        })
        .await?;

        info!(user_id = %user.id, %period_end, cancel_at_period_end, "Billing period updated");
        Ok(outcome(update.user.subscription, update.written))
    }

    /// The processor ended the subscription: downgrade to free.
    #[instrument(skip(self))]
    pub async fn apply_subscription_ended(
        &self,
        customer_ref: &str,
    ) -> Result<ReconcileOutcome, AppError> {
        let identity = BillingIdentity::CustomerRef(customer_ref.to_string());
        let Some(user) = self.resolve(&identity).await? else {
            warn!(customer_ref, "Subscription end matched no user, dropping");
            return Ok(ReconcileOutcome::NoMatchingUser);
        };

        let update = update_user(self.users.as_ref(), &self.locks, user.id, |user| {
            user.subscription.end();
            Ok(())
        })
        .await?;

        info!(user_id = %user.id, "Subscription ended, downgraded to free");
        Ok(outcome(update.user.subscription, update.written))
    }

    async fn resolve(&self, identity: &BillingIdentity) -> Result<Option<User>, AppError> {
        match identity {
            BillingIdentity::Email(email) => self.users.find_user_by_email(email).await,
            BillingIdentity::CustomerRef(reference) => {
                self.users.find_user_by_billing_reference(reference).await
            }
        }
    }
}

fn outcome(subscription: Subscription, written: bool) -> ReconcileOutcome {
    if written {
        ReconcileOutcome::Applied { subscription }
    } else {
        ReconcileOutcome::Unchanged { subscription }
    }
}
