use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::Resume;

/// Passes the resume through only if `caller` owns it.
///
/// Absent and foreign resumes produce the same `NotFound`, so callers
/// cannot probe for other users' resumes.
pub fn owned_by(resume: Option<Resume>, caller: Uuid, resume_id: Uuid) -> Result<Resume, AppError> {
    match resume {
        Some(resume) if resume.user_id == caller => Ok(resume),
        _ => Err(not_found(resume_id)),
    }
}

pub fn not_found(resume_id: Uuid) -> AppError {
    AppError::NotFound(format!("Resume {resume_id} not found"))
}
