// Running deps
pub mod console;
pub mod meet;

// Inspecting what is loaded
pub mod list;
pub mod sources;
pub mod templates;
