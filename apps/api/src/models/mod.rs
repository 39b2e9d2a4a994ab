pub mod plan;
pub mod resume;
pub mod template;
pub mod user;
