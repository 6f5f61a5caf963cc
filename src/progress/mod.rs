pub mod achievements;
pub mod streak;
pub mod tracker;

mod error;
pub use error::{ProgressError, ProgressResult};
