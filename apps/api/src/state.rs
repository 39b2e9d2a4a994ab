use std::sync::Arc;

use crate::billing::{ProcessedEvents, Reconciler, WebhookVerifier};
use crate::config::Config;
use crate::resumes::{ExportRenderer, ResumeService};
use crate::store::{ResumeStore, TemplateStore, UserLocks, UserStore};
use crate::usage::UsageRecorder;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Collaborators are constructed once at startup and passed in; nothing
/// here is process-global.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub reconciler: Reconciler,
    pub resume_service: ResumeService,
    pub webhook_verifier: WebhookVerifier,
    pub processed_events: Arc<dyn ProcessedEvents>,
}

impl AppState {
    /// Wires every service over one store. The reconciler and the usage
    /// recorder share a single `UserLocks` so all writers of a user
    /// document serialize on the same lock.
    pub fn build<S>(
        config: &Config,
        store: Arc<S>,
        processed_events: Arc<dyn ProcessedEvents>,
        exporter: Arc<dyn ExportRenderer>,
    ) -> Self
    where
        S: UserStore + ResumeStore + TemplateStore + 'static,
    {
        let users: Arc<dyn UserStore> = store.clone();
        let resumes: Arc<dyn ResumeStore> = store.clone();
        let templates: Arc<dyn TemplateStore> = store;
        let locks = Arc::new(UserLocks::new());

        let reconciler = Reconciler::new(users.clone(), locks.clone());
        let recorder = UsageRecorder::new(users.clone(), resumes.clone(), locks.clone());
        let resume_service = ResumeService::new(
            users.clone(),
            resumes,
            templates.clone(),
            locks,
            recorder,
            exporter,
        );
        let webhook_verifier = WebhookVerifier::new(
            config.stripe_webhook_secret.clone(),
            config.webhook_tolerance_secs,
        );

        Self {
            users,
            templates,
            reconciler,
            resume_service,
            webhook_verifier,
            processed_events,
        }
    }
}
