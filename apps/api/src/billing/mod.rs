// Subscriptions and entitlements.
// Every subscription write goes through Reconciler; entitlement checks are pure.

pub mod commands;
pub mod entitlement;
pub mod events;
pub mod handlers;
pub mod reconciler;
pub mod webhook;

pub use events::{ProcessedEvents, RedisProcessedEvents};
pub use reconciler::Reconciler;
pub use webhook::WebhookVerifier;
