pub mod phases;
pub mod projects;
pub mod templates;
