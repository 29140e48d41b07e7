//! CLI error types and conversions

use crate::downloader::DownloadError;
use crate::fetcher::{AuthError, TransportError};
use crate::identity::IdentityError;
use crate::metrics::MetricsError;
use crate::output::OutputError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Token acquisition failed
    #[error("authentication error: {0}")]
    AuthError(#[from] AuthError),

    /// Organization could not be determined
    #[error("identity error: {0}")]
    IdentityError(#[from] IdentityError),

    /// HTTP client could not be built
    #[error("transport error: {0}")]
    TransportError(#[from] TransportError),

    /// Download error
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Interactive prompt failed (no terminal, or input aborted)
    #[error("prompt error: {0}")]
    PromptError(String),

    /// Run stopped by Ctrl+C before the report was complete
    #[error("cancelled before the report was complete")]
    Cancelled,
}
