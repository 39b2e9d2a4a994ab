use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::plan::Plan;
use crate::models::template::TemplateId;

/// User aggregate. The subscription and usage ledger are embedded documents
/// owned by the user and persisted together in one write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub subscription: Subscription,
    pub usage: UsageLedger,
    /// Optimistic concurrency token, bumped by the store on every write.
    #[serde(skip)]
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            name: name.trim().to_string(),
            subscription: Subscription::default(),
            usage: UsageLedger::default(),
            revision: 0,
            created_at: Utc::now(),
        }
    }

    /// True when the persisted documents differ, i.e. a write is needed.
    pub fn documents_differ(&self, other: &User) -> bool {
        self.subscription != other.subscription || self.usage != other.usage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    /// Payment processor customer reference.
    pub billing_reference: Option<String>,
    pub period_end: Option<DateTime<Utc>>,
    /// Pending cancellation; takes effect when the billing period ends.
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
            billing_reference: None,
            period_end: None,
            cancel_at_period_end: false,
        }
    }
}

impl Subscription {
    /// The plan entitlement checks should use at `now`.
    ///
    /// A pending cancellation keeps the plan until the recorded period end
    /// passes. An ended subscription already stores `free`; a later manual
    /// upgrade on it grants the upgraded plan.
    pub fn effective_plan(&self, now: DateTime<Utc>) -> Plan {
        match (self.cancel_at_period_end, self.period_end) {
            (true, Some(end)) if end <= now => Plan::Free,
            _ => self.plan,
        }
    }

    /// Grants `plan` and drops any pending cancellation. Status and billing
    /// reference are left as they are.
    pub fn upgrade_manually(&mut self, plan: Plan) {
        self.plan = plan;
        self.cancel_at_period_end = false;
    }

    pub fn confirm_billing(
        &mut self,
        plan: Plan,
        billing_reference: &str,
        period_end: Option<DateTime<Utc>>,
    ) {
        self.plan = plan;
        self.status = SubscriptionStatus::Active;
        self.billing_reference = Some(billing_reference.to_string());
        if period_end.is_some() {
            self.period_end = period_end;
        }
        self.cancel_at_period_end = false;
    }

    /// Marks the subscription for cancellation at period end. Returns false
    /// when there is no paid plan to cancel.
    pub fn request_cancellation(&mut self) -> bool {
        if self.plan == Plan::Free {
            return false;
        }
        self.cancel_at_period_end = true;
        true
    }

    pub fn update_period(&mut self, period_end: DateTime<Utc>, cancel_at_period_end: bool) {
        self.period_end = Some(period_end);
        self.cancel_at_period_end = cancel_at_period_end;
    }

    pub fn end(&mut self) {
        self.plan = Plan::Free;
        self.status = SubscriptionStatus::Canceled;
        self.cancel_at_period_end = false;
    }
}

/// Per-user usage counters. Every counter only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
    pub resumes_created: u64,
    pub downloads: u64,
    pub templates_used: BTreeMap<TemplateId, u64>,
}

impl UsageLedger {
    pub fn record_resume_created(&mut self, template_id: &TemplateId) {
        self.resumes_created += 1;
        self.record_template_use(template_id);
    }

    pub fn record_template_use(&mut self, template_id: &TemplateId) {
        *self.templates_used.entry(template_id.clone()).or_insert(0) += 1;
    }

    pub fn record_download(&mut self) {
        self.downloads += 1;
    }

    pub fn template_count(&self, template_id: &TemplateId) -> u64 {
        self.templates_used.get(template_id).copied().unwrap_or(0)
    }
}
