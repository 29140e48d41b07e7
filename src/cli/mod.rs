//! CLI command implementations

pub mod download;
pub mod error;
pub mod prompt;
pub mod verify;

pub use download::{Cli, Commands, DownloadArgs};
pub use error::CliError;
pub use verify::VerifyCommand;
