pub mod catalog_handlers;
pub mod health_handlers;
pub mod progress_handlers;
pub mod session_handlers;
