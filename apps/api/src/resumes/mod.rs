// Resume lifecycle and the ownership guard every resume operation goes through.
// Usage tracking is delegated to crate::usage; rendering to an injected ExportRenderer.

pub mod export;
pub mod guard;
pub mod handlers;
pub mod service;

pub use export::{ExportRenderer, PrintManifestRenderer};
pub use service::ResumeService;
