// Template catalog. Access is decided by billing::entitlement, never stored per user.

pub mod handlers;
