//! CLI command implementations

pub mod error;
pub mod harvest;
pub mod status;

pub use error::CliError;
pub use harvest::{Cli, Commands};
pub use status::{OutputFormat, StatusArgs};
