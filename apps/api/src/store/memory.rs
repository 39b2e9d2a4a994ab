//! In-memory stores for tests. Same write semantics as Postgres: whole
//! documents, revision-checked user writes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plan::Plan;
use crate::models::resume::Resume;
use crate::models::template::{Template, TemplateId};
use crate::models::user::User;
use crate::store::{ResumeStore, TemplateStore, UserStore};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    resumes: HashMap<Uuid, Resume>,
    templates: HashMap<TemplateId, Template>,
    user_writes: usize,
    pending_conflicts: usize,
    fail_user_writes: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the default catalog.
    pub async fn with_catalog() -> Self {
        let store = Self::new();
        for (id, category) in [
            ("modern", Plan::Free),
            ("minimal", Plan::Free),
            ("executive", Plan::Premium),
            ("tech-pro", Plan::Vip),
        ] {
            store.seed_template(id, category).await;
        }
        store
    }

    pub async fn seed_user(&self, email: &str) -> User {
        let user = User::new(email, "Test User");
        self.state
            .lock()
            .await
            .users
            .insert(user.id, user.clone());
        user
    }

    pub async fn seed_template(&self, id: &str, category: Plan) -> Template {
        let template = Template {
            id: TemplateId::normalize(id).expect("valid template id"),
            name: id.to_string(),
            category,
            description: None,
            price_cents: 0,
            usage_count: 0,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .templates
            .insert(template.id.clone(), template.clone());
        template
    }

    /// Number of successful user document writes.
    pub async fn user_writes(&self) -> usize {
        self.state.lock().await.user_writes
    }

    /// The next `n` user writes fail with `Conflict`.
    pub async fn inject_conflicts(&self, n: usize) {
        self.state.lock().await.pending_conflicts = n;
    }

    /// All user writes fail with a database error while set.
    pub async fn fail_user_writes(&self, fail: bool) {
        self.state.lock().await.fail_user_writes = fail;
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_billing_reference(
        &self,
        billing_reference: &str,
    ) -> Result<Option<User>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|u| u.subscription.billing_reference.as_deref() == Some(billing_reference))
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "Email {} is already registered",
                user.email
            )));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn save_user(&self, user: &User) -> Result<User, AppError> {
        let mut state = self.state.lock().await;
        if state.fail_user_writes {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(AppError::Conflict(format!("User {} was modified", user.id)));
        }
        let stored = state
            .users
            .get_mut(&user.id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.id)))?;
        if stored.revision != user.revision {
            return Err(AppError::Conflict(format!("User {} was modified", user.id)));
        }
        stored.subscription = user.subscription.clone();
        stored.usage = user.usage.clone();
        stored.revision += 1;
        let saved = stored.clone();
        state.user_writes += 1;
        Ok(saved)
    }
}

#[async_trait]
impl ResumeStore for MemoryStore {
    async fn find_resume(&self, id: Uuid) -> Result<Option<Resume>, AppError> {
        Ok(self.state.lock().await.resumes.get(&id).cloned())
    }

    async fn find_resume_by_title(
        &self,
        user_id: Uuid,
        title: &str,
    ) -> Result<Option<Resume>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .resumes
            .values()
            .find(|r| r.user_id == user_id && r.title == title)
            .cloned())
    }

    async fn list_resumes(&self, user_id: Uuid) -> Result<Vec<Resume>, AppError> {
        let state = self.state.lock().await;
        let mut resumes: Vec<Resume> = state
            .resumes
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        resumes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(resumes)
    }

    async fn insert_resume(&self, resume: &Resume) -> Result<(), AppError> {
        self.state
            .lock()
            .await
            .resumes
            .insert(resume.id, resume.clone());
        Ok(())
    }

    async fn save_resume(&self, resume: &Resume) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        match state.resumes.get_mut(&resume.id) {
            Some(stored) if stored.user_id == resume.user_id => {
                *stored = resume.clone();
                Ok(())
            }
            _ => Err(AppError::NotFound(format!("Resume {} not found", resume.id))),
        }
    }

    async fn delete_resume(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let owned = state
            .resumes
            .get(&id)
            .is_some_and(|r| r.user_id == user_id);
        if owned {
            state.resumes.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn list_templates(&self) -> Result<Vec<Template>, AppError> {
        let state = self.state.lock().await;
        let mut templates: Vec<Template> = state.templates.values().cloned().collect();
        templates.sort_by(|a, b| a.category.cmp(&b.category).then(a.id.cmp(&b.id)));
        Ok(templates)
    }

    async fn find_template(&self, id: &TemplateId) -> Result<Option<Template>, AppError> {
        Ok(self.state.lock().await.templates.get(id).cloned())
    }

    async fn increment_template_usage(&self, id: &TemplateId) -> Result<(), AppError> {
        if let Some(t) = self.state.lock().await.templates.get_mut(id) {
            t.usage_count += 1;
        }
        Ok(())
    }
}
