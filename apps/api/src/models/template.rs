use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::plan::Plan;

/// Canonical template identifier: trimmed, ASCII-lowercased, non-empty.
///
/// Every ingestion point goes through [`TemplateId::normalize`], so the usage
/// histogram never holds two entries for the same logical template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    pub fn normalize(raw: &str) -> Result<Self, AppError> {
        let canonical = raw.trim().to_ascii_lowercase();
        if canonical.is_empty() {
            return Err(AppError::Validation(
                "templateId must not be empty".to_string(),
            ));
        }
        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TemplateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A template identifier as it arrives on the wire: clients send either a
/// string or a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTemplateId {
    Text(String),
    Number(i64),
}

impl RawTemplateId {
    pub fn canonical(&self) -> Result<TemplateId, AppError> {
        match self {
            Self::Text(s) => TemplateId::normalize(s),
            Self::Number(n) => TemplateId::normalize(&n.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    /// Minimum plan required to use this template.
    pub category: Plan,
    pub description: Option<String>,
    pub price_cents: i64,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}
