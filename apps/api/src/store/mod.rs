//! Persistence collaborators.
//!
//! Every write is a whole-document write: a user's subscription and usage
//! ledger go to storage together, a resume is saved as one row. Writes to
//! the user document are guarded by `User::revision`; a stale revision is
//! reported as `AppError::Conflict`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::Resume;
use crate::models::template::{Template, TemplateId};
use crate::models::user::User;

pub mod locks;
#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use locks::{update_user, UserLocks};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// `email` must already be lowercased.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_billing_reference(
        &self,
        billing_reference: &str,
    ) -> Result<Option<User>, AppError>;

    /// Fails with `Conflict` if the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    /// Writes subscription and usage atomically if `user.revision` still
    /// matches the stored revision. Returns the user with its new revision.
    async fn save_user(&self, user: &User) -> Result<User, AppError>;
}

#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn find_resume(&self, id: Uuid) -> Result<Option<Resume>, AppError>;

    async fn find_resume_by_title(
        &self,
        user_id: Uuid,
        title: &str,
    ) -> Result<Option<Resume>, AppError>;

    /// Most recently updated first.
    async fn list_resumes(&self, user_id: Uuid) -> Result<Vec<Resume>, AppError>;

    async fn insert_resume(&self, resume: &Resume) -> Result<(), AppError>;

    async fn save_resume(&self, resume: &Resume) -> Result<(), AppError>;

    /// Returns false when no resume with that id belongs to `user_id`.
    async fn delete_resume(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn list_templates(&self) -> Result<Vec<Template>, AppError>;

    async fn find_template(&self, id: &TemplateId) -> Result<Option<Template>, AppError>;

    async fn increment_template_usage(&self, id: &TemplateId) -> Result<(), AppError>;
}
