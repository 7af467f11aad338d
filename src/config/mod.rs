//! Configuration management
//!
//! Handles connection targets and runtime settings.

pub mod connections;
pub mod settings;

pub use connections::{ConnectionConfig, SslMode};
pub use settings::{RuntimeOptions, Settings, load_settings};
