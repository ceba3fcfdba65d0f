/// Failure kinds of a sync run. Every stage returns these unmodified to the
/// driver; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Non-success status or transport failure on an upstream source.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The upstream table or CSV does not have the expected structure.
    #[error("unexpected source layout: {0}")]
    Schema(String),

    /// The hosting API answered with a status other than 200/201/404.
    #[error("hosting API returned HTTP {status}: {body}")]
    Publish { status: u16, body: String },

    /// Remote content could not be decoded as base64 UTF-8 text.
    #[error("invalid remote content: {0}")]
    Decode(String),

    /// Document database call failed.
    #[error("config store error: {0}")]
    Config(String),

    /// Missing or malformed environment setting.
    #[error("settings error: {0}")]
    Settings(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
