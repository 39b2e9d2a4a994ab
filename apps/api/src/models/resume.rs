use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::template::TemplateId;

pub const DEFAULT_TITLE: &str = "Untitled Resume";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub template_id: TemplateId,
    pub content: Value,
    /// Incremented on every content update; starts at 1.
    pub version: i32,
    pub downloads: i64,
    pub last_printed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resume {
    pub fn new(user_id: Uuid, title: String, template_id: TemplateId, content: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            template_id,
            content,
            version: 1,
            downloads: 0,
            last_printed: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn revise(&mut self, content: Value) {
        self.content = content;
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Download tracking never touches `version`.
    pub fn mark_downloaded(&mut self, at: DateTime<Utc>) {
        self.downloads += 1;
        self.last_printed = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_revise_bumps_version() {
        let mut resume = Resume::new(
            Uuid::new_v4(),
            "CV".to_string(),
            TemplateId::normalize("modern").unwrap(),
            json!({}),
        );
        resume.revise(json!({"summary": "x"}));
        resume.revise(json!({"summary": "y"}));
        assert_eq!(resume.version, 3);
        assert_eq!(resume.content, json!({"summary": "y"}));
    }

    #[test]
    fn test_download_leaves_version_alone() {
        let mut resume = Resume::new(
            Uuid::new_v4(),
            "CV".to_string(),
            TemplateId::normalize("modern").unwrap(),
            json!({}),
        );
        let at = Utc::now();
        resume.mark_downloaded(at);
        assert_eq!(resume.version, 1);
        assert_eq!(resume.downloads, 1);
        assert_eq!(resume.last_printed, Some(at));
    }
}
