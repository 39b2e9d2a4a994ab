//! Resume lifecycle: create, sync, update, delete, download, export.
//!
//! The resume write is the primary effect. Usage recording runs after it,
//! with the user's lock released, and its failures are logged only.

use std::sync::Arc;

use axum::http::HeaderValue;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::entitlement;
use crate::errors::AppError;
use crate::models::resume::{Resume, DEFAULT_TITLE};
use crate::models::template::{Template, TemplateId};
use crate::resumes::export::{ExportArtifact, ExportRenderer};
use crate::resumes::guard;
use crate::store::{ResumeStore, TemplateStore, UserLocks, UserStore};
use crate::usage::{DownloadReceipt, UsageRecorder};

#[derive(Debug, Clone)]
pub struct NewResume {
    pub title: Option<String>,
    pub template_id: TemplateId,
    pub content: Value,
}

#[derive(Debug, Clone)]
pub struct SyncedResume {
    pub title: String,
    pub template_id: TemplateId,
    pub content: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub resume: Resume,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub artifact: ExportArtifact,
    pub content_type: HeaderValue,
    pub disposition: HeaderValue,
    pub receipt: DownloadReceipt,
}

#[derive(Clone)]
pub struct ResumeService {
    users: Arc<dyn UserStore>,
    resumes: Arc<dyn ResumeStore>,
    templates: Arc<dyn TemplateStore>,
    locks: Arc<UserLocks>,
    recorder: UsageRecorder,
    exporter: Arc<dyn ExportRenderer>,
}

impl ResumeService {
    pub fn new(
        users: Arc<dyn UserStore>,
        resumes: Arc<dyn ResumeStore>,
        templates: Arc<dyn TemplateStore>,
        locks: Arc<UserLocks>,
        recorder: UsageRecorder,
        exporter: Arc<dyn ExportRenderer>,
    ) -> Self {
        Self {
            users,
            resumes,
            templates,
            locks,
            recorder,
            exporter,
        }
    }

    /// Checks the caller's effective plan against the template's tier.
    /// Runs before any write.
    pub async fn authorize_template(
        &self,
        user_id: Uuid,
        template_id: &TemplateId,
    ) -> Result<Template, AppError> {
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;
        let template = self
            .templates
            .find_template(template_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Template {template_id} not found")))?;

        let plan = user.subscription.effective_plan(Utc::now());
        entitlement::require(plan, template.category)?;
        Ok(template)
    }

    pub async fn create(&self, user_id: Uuid, new: NewResume) -> Result<Resume, AppError> {
        let template = self.authorize_template(user_id, &new.template_id).await?;

        let title = new
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let resume = Resume::new(user_id, title, template.id.clone(), new.content);
        self.resumes.insert_resume(&resume).await?;
        info!(%user_id, resume_id = %resume.id, template_id = %template.id, "Resume created");

        self.track_created(user_id, &template.id).await;
        Ok(resume)
    }

    /// Create-or-update keyed by (user, title).
    pub async fn sync(&self, user_id: Uuid, synced: SyncedResume) -> Result<SyncResult, AppError> {
        let template = self.authorize_template(user_id, &synced.template_id).await?;

        let result = {
            let _guard = self.locks.acquire(user_id).await;
            match self
                .resumes
                .find_resume_by_title(user_id, &synced.title)
                .await?
            {
                Some(mut resume) => {
                    resume.template_id = template.id.clone();
                    resume.revise(synced.content);
                    self.resumes.save_resume(&resume).await?;
                    SyncResult {
                        resume,
                        created: false,
                    }
                }
                None => {
                    let resume =
                        Resume::new(user_id, synced.title, template.id.clone(), synced.content);
                    self.resumes.insert_resume(&resume).await?;
                    SyncResult {
                        resume,
                        created: true,
                    }
                }
            }
        };
        info!(
            %user_id,
            resume_id = %result.resume.id,
            created = result.created,
            version = result.resume.version,
            "Resume synced"
        );

        if result.created {
            self.track_created(user_id, &template.id).await;
        } else {
            self.track_reuse(user_id, &template.id).await;
        }
        Ok(result)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
        title: Option<String>,
        content: Value,
    ) -> Result<Resume, AppError> {
        let resume = {
            let _guard = self.locks.acquire(user_id).await;
            let found = self.resumes.find_resume(resume_id).await?;
            let mut resume = guard::owned_by(found, user_id, resume_id)?;
            if let Some(title) = title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
                resume.title = title;
            }
            resume.revise(content);
            self.resumes.save_resume(&resume).await?;
            resume
        };
        info!(%user_id, %resume_id, version = resume.version, "Resume updated");

        self.track_reuse(user_id, &resume.template_id).await;
        Ok(resume)
    }

    pub async fn get(&self, user_id: Uuid, resume_id: Uuid) -> Result<Resume, AppError> {
        let found = self.resumes.find_resume(resume_id).await?;
        guard::owned_by(found, user_id, resume_id)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Resume>, AppError> {
        self.resumes.list_resumes(user_id).await
    }

    /// Ledger counters are not decremented.
    pub async fn delete(&self, user_id: Uuid, resume_id: Uuid) -> Result<(), AppError> {
        if !self.resumes.delete_resume(resume_id, user_id).await? {
            return Err(guard::not_found(resume_id));
        }
        info!(%user_id, %resume_id, "Resume deleted");
        Ok(())
    }

    pub async fn record_download(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
    ) -> Result<DownloadReceipt, AppError> {
        self.recorder.record_download(user_id, resume_id).await
    }

    /// Renders and builds the response metadata first, then counts the
    /// download: an export that cannot be served changes no counters.
    pub async fn export(&self, user_id: Uuid, resume_id: Uuid) -> Result<ExportResult, AppError> {
        let resume = self.get(user_id, resume_id).await?;
        let artifact = self.exporter.render(&resume).await?;
        let content_type = artifact.content_type_header()?;
        let disposition = artifact.content_disposition()?;
        let receipt = self.recorder.record_download(user_id, resume_id).await?;
        Ok(ExportResult {
            artifact,
            content_type,
            disposition,
            receipt,
        })
    }

    async fn track_created(&self, user_id: Uuid, template_id: &TemplateId) {
        if let Err(e) = self.recorder.record_resume_created(user_id, template_id).await {
            warn!(%user_id, %template_id, "Failed to record resume creation: {e}");
        }
        if let Err(e) = self.templates.increment_template_usage(template_id).await {
            warn!(%template_id, "Failed to bump template popularity: {e}");
        }
    }

    async fn track_reuse(&self, user_id: Uuid, template_id: &TemplateId) {
        if let Err(e) = self.recorder.record_template_reuse(user_id, template_id).await {
            warn!(%user_id, %template_id, "Failed to record template reuse: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::commands::BillingIdentity;
    use crate::billing::reconciler::Reconciler;
    use crate::models::plan::Plan;
    use crate::resumes::export::{ExportError, PrintManifestRenderer};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: ResumeService,
        reconciler: Reconciler,
    }

    async fn fixture_with(exporter: Arc<dyn ExportRenderer>) -> Fixture {
        let store = Arc::new(MemoryStore::with_catalog().await);
        let locks = Arc::new(UserLocks::new());
        let recorder = UsageRecorder::new(store.clone(), store.clone(), locks.clone());
        let service = ResumeService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            locks.clone(),
            recorder,
            exporter,
        );
        let reconciler = Reconciler::new(store.clone(), locks);
        Fixture {
            store,
            service,
            reconciler,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(PrintManifestRenderer)).await
    }

    fn tid(s: &str) -> TemplateId {
        TemplateId::normalize(s).unwrap()
    }

    fn new_resume(template: &str) -> NewResume {
        NewResume {
            title: Some("My CV".to_string()),
            template_id: tid(template),
            content: json!({"name": "Ada"}),
        }
    }

    #[tokio::test]
    async fn test_premium_template_denied_then_allowed_after_upgrade() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;

        let denied = f.service.create(user.id, new_resume("executive")).await;
        match denied {
            Err(AppError::AccessDenied { required }) => assert_eq!(required, Plan::Premium),
            other => panic!("expected AccessDenied, got {other:?}"),
        }
        let untouched = f.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(untouched.usage.resumes_created, 0);
        assert!(f.store.list_resumes(user.id).await.unwrap().is_empty());

        f.reconciler
            .apply_manual_upgrade(user.id, Plan::Premium)
            .await
            .unwrap();
        f.service.create(user.id, new_resume("executive")).await.unwrap();

        let after = f.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(after.usage.resumes_created, 1);
        assert_eq!(after.usage.templates_used.len(), 1);
        assert_eq!(after.usage.template_count(&tid("executive")), 1);
    }

    #[tokio::test]
    async fn test_manual_upgrade_after_subscription_ended_restores_access() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let identity = BillingIdentity::email("a@x.com");

        f.reconciler
            .apply_billing_confirmation(&identity, Plan::Vip, "cus_1", None)
            .await
            .unwrap();
        f.reconciler.apply_subscription_ended("cus_1").await.unwrap();
        assert!(matches!(
            f.service.create(user.id, new_resume("executive")).await,
            Err(AppError::AccessDenied { .. })
        ));

        f.reconciler
            .apply_manual_upgrade(user.id, Plan::Premium)
            .await
            .unwrap();
        f.service.create(user.id, new_resume("executive")).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_defaults_title_and_bumps_popularity() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let resume = f
            .service
            .create(
                user.id,
                NewResume {
                    title: Some("  ".to_string()),
                    template_id: tid("modern"),
                    content: json!({}),
                },
            )
            .await
            .unwrap();
        assert_eq!(resume.title, DEFAULT_TITLE);
        assert_eq!(resume.version, 1);

        let template = f.store.find_template(&tid("modern")).await.unwrap().unwrap();
        assert_eq!(template.usage_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_template_is_not_found() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let result = f.service.create(user.id, new_resume("nope")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sync_creates_then_updates() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let synced = |content: Value| SyncedResume {
            title: "Backend".to_string(),
            template_id: tid("modern"),
            content,
        };

        let first = f.service.sync(user.id, synced(json!({"v": 1}))).await.unwrap();
        assert!(first.created);
        let second = f.service.sync(user.id, synced(json!({"v": 2}))).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.resume.id, first.resume.id);
        assert_eq!(second.resume.version, 2);

        let user = f.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.usage.resumes_created, 1);
        assert_eq!(user.usage.template_count(&tid("modern")), 2);
    }

    #[tokio::test]
    async fn test_sync_respects_template_tier() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let result = f
            .service
            .sync(
                user.id,
                SyncedResume {
                    title: "Backend".to_string(),
                    template_id: tid("tech-pro"),
                    content: json!({}),
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(AppError::AccessDenied { required: Plan::Vip })
        ));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_counts_reuse() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let resume = f.service.create(user.id, new_resume("modern")).await.unwrap();

        let updated = f
            .service
            .update(user.id, resume.id, Some("Renamed".to_string()), json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.title, "Renamed");

        let user = f.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.usage.resumes_created, 1);
        assert_eq!(user.usage.template_count(&tid("modern")), 2);
    }

    #[tokio::test]
    async fn test_foreign_resume_is_invisible() {
        let f = fixture().await;
        let owner = f.store.seed_user("owner@x.com").await;
        let other = f.store.seed_user("other@x.com").await;
        let resume = f.service.create(owner.id, new_resume("modern")).await.unwrap();

        assert!(matches!(
            f.service.get(other.id, resume.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.service.update(other.id, resume.id, None, json!({})).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.service.delete(other.id, resume.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(f.service.get(owner.id, resume.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_is_terminal_and_keeps_ledger() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let resume = f.service.create(user.id, new_resume("modern")).await.unwrap();

        f.service.delete(user.id, resume.id).await.unwrap();
        assert!(matches!(
            f.service.get(user.id, resume.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.service.record_download(user.id, resume.id).await,
            Err(AppError::NotFound(_))
        ));
        let user = f.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.usage.resumes_created, 1);
    }

    #[tokio::test]
    async fn test_usage_failure_does_not_fail_create() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        f.store.fail_user_writes(true).await;

        let resume = f.service.create(user.id, new_resume("modern")).await.unwrap();
        assert!(f.store.find_resume(resume.id).await.unwrap().is_some());
        let user = f.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.usage.resumes_created, 0);
    }

    #[tokio::test]
    async fn test_export_counts_a_download() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let resume = f.service.create(user.id, new_resume("modern")).await.unwrap();

        let result = f.service.export(user.id, resume.id).await.unwrap();
        assert_eq!(result.artifact.filename, "My_CV.pdf");
        assert_eq!(result.receipt.resume_downloads, 1);
        assert_eq!(result.receipt.user_downloads, Some(1));
    }

    #[tokio::test]
    async fn test_export_with_control_character_in_title() {
        let f = fixture().await;
        let user = f.store.seed_user("a@x.com").await;
        let resume = f
            .service
            .create(
                user.id,
                NewResume {
                    title: Some("CV\u{1}v2".to_string()),
                    template_id: tid("modern"),
                    content: json!({}),
                },
            )
            .await
            .unwrap();

        let result = f.service.export(user.id, resume.id).await.unwrap();
        assert_eq!(result.artifact.filename, "CVv2.pdf");
        assert_eq!(result.disposition, "attachment; filename=\"CVv2.pdf\"");
        assert_eq!(result.receipt.resume_downloads, 1);
    }

    /// Hands back a filename no header can carry.
    struct UnservableRenderer;

    #[async_trait]
    impl ExportRenderer for UnservableRenderer {
        async fn render(&self, _resume: &Resume) -> Result<ExportArtifact, ExportError> {
            Ok(ExportArtifact {
                filename: "bad\nname.pdf".to_string(),
                content_type: "application/json",
                bytes: bytes::Bytes::from_static(b"{}"),
            })
        }
    }

    #[tokio::test]
    async fn test_unservable_export_changes_no_counters() {
        let f = fixture_with(Arc::new(UnservableRenderer)).await;
        let user = f.store.seed_user("a@x.com").await;
        let resume = f.service.create(user.id, new_resume("modern")).await.unwrap();

        let result = f.service.export(user.id, resume.id).await;
        assert!(matches!(result, Err(AppError::Export(_))));

        let stored = f.store.find_resume(resume.id).await.unwrap().unwrap();
        assert_eq!(stored.downloads, 0);
        let user = f.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.usage.downloads, 0);
    }

    struct FailingRenderer;

    #[async_trait]
    impl ExportRenderer for FailingRenderer {
        async fn render(&self, _resume: &Resume) -> Result<ExportArtifact, ExportError> {
            Err(ExportError::Renderer("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_export_changes_no_counters() {
        let f = fixture_with(Arc::new(FailingRenderer)).await;
        let user = f.store.seed_user("a@x.com").await;
        let resume = f.service.create(user.id, new_resume("modern")).await.unwrap();

        let result = f.service.export(user.id, resume.id).await;
        assert!(matches!(result, Err(AppError::Export(_))));

        let stored = f.store.find_resume(resume.id).await.unwrap().unwrap();
        assert_eq!(stored.downloads, 0);
        let user = f.store.find_user(user.id).await.unwrap().unwrap();
        assert_eq!(user.usage.downloads, 0);
    }
}
