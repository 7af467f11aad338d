//! Command-line commands
//!
//! Parses arguments into a [`Command`] and runs it against a feed store.

pub mod handlers;
pub mod parser;

pub use handlers::{CommandOutput, download, execute};
pub use parser::{Cli, Command, FeedSource};
