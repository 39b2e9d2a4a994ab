use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::plan::Plan;
use crate::models::resume::Resume;
use crate::models::template::{Template, TemplateId};
use crate::models::user::{Subscription, UsageLedger, User};
use crate::store::{ResumeStore, TemplateStore, UserStore};

/// PostgreSQL-backed implementation of all store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    subscription: Json<Subscription>,
    usage: Json<UsageLedger>,
    revision: i64,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            name: row.name,
            subscription: row.subscription.0,
            usage: row.usage.0,
            revision: row.revision,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ResumeRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    template_id: String,
    content: Value,
    version: i32,
    downloads: i64,
    last_printed: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ResumeRow> for Resume {
    type Error = AppError;

    fn try_from(row: ResumeRow) -> Result<Self, Self::Error> {
        Ok(Resume {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            template_id: TemplateId::normalize(&row.template_id)?,
            content: row.content,
            version: row.version,
            downloads: row.downloads,
            last_printed: row.last_printed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: String,
    name: String,
    category: String,
    description: Option<String>,
    price_cents: i64,
    usage_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for Template {
    type Error = AppError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let category: Plan = row.category.parse().map_err(|e| {
            AppError::Internal(anyhow::anyhow!("template '{}' has {e}", row.id))
        })?;
        if !category.is_template_tier() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "template '{}' is gated on unsupported tier {category}",
                row.id
            )));
        }
        Ok(Template {
            id: TemplateId::normalize(&row.id)?,
            name: row.name,
            category,
            description: row.description,
            price_cents: row.price_cents,
            usage_count: row.usage_count,
            created_at: row.created_at,
        })
    }
}

const USER_COLUMNS: &str = "id, email, name, subscription, usage, revision, created_at";

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_billing_reference(
        &self,
        billing_reference: &str,
    ) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE subscription ->> 'billing_reference' = $1 LIMIT 1"
        ))
        .bind(billing_reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, subscription, usage, revision, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(Json(&user.subscription))
        .bind(Json(&user.usage))
        .bind(user.revision)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                format!("Email {} is already registered", user.email),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_user(&self, user: &User) -> Result<User, AppError> {
        // Subscription and usage land in one statement; the revision guard
        // turns a lost update into a Conflict.
        let revision: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET subscription = $2, usage = $3, revision = revision + 1, updated_at = now()
            WHERE id = $1 AND revision = $4
            RETURNING revision
            "#,
        )
        .bind(user.id)
        .bind(Json(&user.subscription))
        .bind(Json(&user.usage))
        .bind(user.revision)
        .fetch_optional(&self.pool)
        .await?;

        match revision {
            Some(revision) => Ok(User {
                revision,
                ..user.clone()
            }),
            None => Err(AppError::Conflict(format!(
                "User {} was modified concurrently",
                user.id
            ))),
        }
    }
}

const RESUME_COLUMNS: &str = "id, user_id, title, template_id, content, version, downloads, \
                              last_printed, created_at, updated_at";

#[async_trait]
impl ResumeStore for PgStore {
    async fn find_resume(&self, id: Uuid) -> Result<Option<Resume>, AppError> {
        let row: Option<ResumeRow> =
            sqlx::query_as(&format!("SELECT {RESUME_COLUMNS} FROM resumes WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Resume::try_from).transpose()
    }

    async fn find_resume_by_title(
        &self,
        user_id: Uuid,
        title: &str,
    ) -> Result<Option<Resume>, AppError> {
        let row: Option<ResumeRow> = sqlx::query_as(&format!(
            "SELECT {RESUME_COLUMNS} FROM resumes WHERE user_id = $1 AND title = $2 \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(user_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Resume::try_from).transpose()
    }

    async fn list_resumes(&self, user_id: Uuid) -> Result<Vec<Resume>, AppError> {
        let rows: Vec<ResumeRow> = sqlx::query_as(&format!(
            "SELECT {RESUME_COLUMNS} FROM resumes WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Resume::try_from).collect()
    }

    async fn insert_resume(&self, resume: &Resume) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO resumes
                (id, user_id, title, template_id, content, version, downloads,
                 last_printed, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(resume.id)
        .bind(resume.user_id)
        .bind(&resume.title)
        .bind(resume.template_id.as_str())
        .bind(&resume.content)
        .bind(resume.version)
        .bind(resume.downloads)
        .bind(resume.last_printed)
        .bind(resume.created_at)
        .bind(resume.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_resume(&self, resume: &Resume) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE resumes
            SET title = $3, template_id = $4, content = $5, version = $6,
                downloads = $7, last_printed = $8, updated_at = $9
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(resume.id)
        .bind(resume.user_id)
        .bind(&resume.title)
        .bind(resume.template_id.as_str())
        .bind(&resume.content)
        .bind(resume.version)
        .bind(resume.downloads)
        .bind(resume.last_printed)
        .bind(resume.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Resume {} not found", resume.id)));
        }
        Ok(())
    }

    async fn delete_resume(&self, id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl TemplateStore for PgStore {
    async fn list_templates(&self) -> Result<Vec<Template>, AppError> {
        let rows: Vec<TemplateRow> = sqlx::query_as(
            r#"
            SELECT id, name, category, description, price_cents, usage_count, created_at
            FROM templates
            ORDER BY CASE category WHEN 'free' THEN 0 WHEN 'premium' THEN 1 ELSE 2 END, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Template::try_from).collect()
    }

    async fn find_template(&self, id: &TemplateId) -> Result<Option<Template>, AppError> {
        let row: Option<TemplateRow> = sqlx::query_as(
            "SELECT id, name, category, description, price_cents, usage_count, created_at \
             FROM templates WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Template::try_from).transpose()
    }

    async fn increment_template_usage(&self, id: &TemplateId) -> Result<(), AppError> {
        sqlx::query("UPDATE templates SET usage_count = usage_count + 1 WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
