//! Usage recorder: applies ledger increments for resume events.
//!
//! Increments go through the same per-user lock and whole-document write as
//! subscription transitions, so a ledger update is either fully applied or
//! not at all.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::template::TemplateId;
use crate::models::user::UsageLedger;
use crate::resumes::guard;
use crate::store::locks::update_user_locked;
use crate::store::{update_user, ResumeStore, UserLocks, UserStore};

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReceipt {
    pub resume_id: Uuid,
    pub resume_downloads: i64,
    pub last_printed: DateTime<Utc>,
    /// `None` when the ledger update failed; the resume counter still stands.
    pub user_downloads: Option<u64>,
}

#[derive(Clone)]
pub struct UsageRecorder {
    users: Arc<dyn UserStore>,
    resumes: Arc<dyn ResumeStore>,
    locks: Arc<UserLocks>,
}

impl UsageRecorder {
    pub fn new(
        users: Arc<dyn UserStore>,
        resumes: Arc<dyn ResumeStore>,
        locks: Arc<UserLocks>,
    ) -> Self {
        Self {
            users,
            resumes,
            locks,
        }
    }

    /// A brand-new resume: bumps `resumes_created` and the template count.
    pub async fn record_resume_created(
        &self,
        user_id: Uuid,
        template_id: &TemplateId,
    ) -> Result<UsageLedger, AppError> {
        let update = update_user(self.users.as_ref(), &self.locks, user_id, |user| {
            user.usage.record_resume_created(template_id);
            Ok(())
        })
        .await?;
        debug!(%user_id, %template_id, "Recorded resume creation");
        Ok(update.user.usage)
    }

    /// An existing resume re-saved against a template: template count only.
    pub async fn record_template_reuse(
        &self,
        user_id: Uuid,
        template_id: &TemplateId,
    ) -> Result<UsageLedger, AppError> {
        let update = update_user(self.users.as_ref(), &self.locks, user_id, |user| {
            user.usage.record_template_use(template_id);
            Ok(())
        })
        .await?;
        debug!(%user_id, %template_id, "Recorded template reuse");
        Ok(update.user.usage)
    }

    /// Bumps the resume's own download counter and the user's ledger under
    /// one hold of the user's lock. A missing or foreign resume leaves
    /// every counter untouched.
    pub async fn record_download(
        &self,
        user_id: Uuid,
        resume_id: Uuid,
    ) -> Result<DownloadReceipt, AppError> {
        let _guard = self.locks.acquire(user_id).await;

        let found = self.resumes.find_resume(resume_id).await?;
        let mut resume = guard::owned_by(found, user_id, resume_id)?;
        let now = Utc::now();
        resume.mark_downloaded(now);
        self.resumes.save_resume(&resume).await?;

        let user_downloads = match update_user_locked(self.users.as_ref(), user_id, |user| {
            user.usage.record_download();
            Ok(())
        })
        .await
        {
            Ok(update) => Some(update.user.usage.downloads),
            Err(e) => {
                warn!(%user_id, %resume_id, "Failed to record download in usage ledger: {e}");
                None
            }
        };

        info!(%user_id, %resume_id, downloads = resume.downloads, "Download recorded");
        Ok(DownloadReceipt {
            resume_id,
            resume_downloads: resume.downloads,
            last_printed: now,
            user_downloads,
        })
    }
}
