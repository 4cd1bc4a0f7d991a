pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use events::ActivityEvent;
pub use types::*;
