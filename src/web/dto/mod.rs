pub mod auth;
pub mod progress;
pub mod resources;
