// Usage ledger bookkeeping for resume creation, template reuse and downloads.
// Ledger failures are logged by callers and never roll back the resume write.

pub mod recorder;

pub use recorder::{DownloadReceipt, UsageRecorder};
