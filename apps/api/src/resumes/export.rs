use async_trait::async_trait;
use axum::http::{header::InvalidHeaderValue, HeaderValue};
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;

use crate::errors::AppError;
use crate::models::resume::Resume;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("renderer failed: {0}")]
    Renderer(String),

    #[error("could not encode resume: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("artifact metadata is not a valid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

impl From<ExportError> for AppError {
    fn from(e: ExportError) -> Self {
        AppError::Export(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Bytes,
}

impl ExportArtifact {
    pub fn content_type_header(&self) -> Result<HeaderValue, ExportError> {
        Ok(HeaderValue::from_str(self.content_type)?)
    }

    /// The `Content-Disposition` value for this artifact.
    pub fn content_disposition(&self) -> Result<HeaderValue, ExportError> {
        let value = format!("attachment; filename=\"{}\"", self.filename);
        Ok(HeaderValue::try_from(value)?)
    }
}

/// Turns a resume snapshot into a downloadable artifact. Called without any
/// lock held; failures are reported, never retried.
#[async_trait]
pub trait ExportRenderer: Send + Sync {
    async fn render(&self, resume: &Resume) -> Result<ExportArtifact, ExportError>;
}

/// Emits a print manifest that the browser client lays out as a PDF.
pub struct PrintManifestRenderer;

#[async_trait]
impl ExportRenderer for PrintManifestRenderer {
    async fn render(&self, resume: &Resume) -> Result<ExportArtifact, ExportError> {
        let filename = export_filename(&resume.title);
        let manifest = json!({
            "resume_id": resume.id,
            "title": resume.title,
            "template": resume.template_id,
            "version": resume.version,
            "filename": filename,
            "content": resume.content,
        });
        Ok(ExportArtifact {
            filename,
            content_type: "application/json",
            bytes: Bytes::from(serde_json::to_vec(&manifest)?),
        })
    }
}

/// `My  Resume` → `My_Resume.pdf`. Path separators, quotes and control
/// characters are dropped so the name is safe inside a Content-Disposition
/// header.
pub fn export_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '"') && !c.is_control())
        .collect();
    let stem = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    if stem.is_empty() {
        "Untitled_Resume.pdf".to_string()
    } else {
        format!("{stem}.pdf")
    }
}
