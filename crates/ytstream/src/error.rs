use reqwest::StatusCode;

use crate::cipher::CipherError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("signature decoding failed: {source}")]
    Cipher {
        #[from]
        source: CipherError,
    },

    #[error("rendition {itag} is cipher-protected but the manifest has no player URL")]
    MissingPlayerUrl { itag: u32 },

    #[error("malformed signature cipher on rendition {itag}: {reason}")]
    MalformedCipher { itag: u32, reason: String },

    #[error("rendition {itag} has neither a URL nor a signature cipher")]
    MissingUrl { itag: u32 },

    #[error("rendition {itag} has no resolved URL")]
    Unresolved { itag: u32 },

    #[error("no segmented streamer configured for `{url}`")]
    SegmentedUnavailable { url: String },

    #[error("segmented stream error: {reason}")]
    Segmented { reason: String },

    #[error("download stalled at {received}/{expected} bytes after {attempts} reconnects")]
    Stalled {
        received: u64,
        expected: u64,
        attempts: u32,
    },
}

impl Error {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn malformed_cipher(itag: u32, reason: impl Into<String>) -> Self {
        Self::MalformedCipher {
            itag,
            reason: reason.into(),
        }
    }

    pub fn segmented(reason: impl Into<String>) -> Self {
        Self::Segmented {
            reason: reason.into(),
        }
    }

    /// Errors caused by the manifest itself rather than by the network.
    pub fn is_malformed_manifest(&self) -> bool {
        matches!(
            self,
            Self::MissingPlayerUrl { .. } | Self::MalformedCipher { .. } | Self::MissingUrl { .. }
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { source } => crate::delivery::retry::is_retryable_reqwest_error(source),
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Stalled { .. } => true,
            Self::Configuration { .. }
            | Self::Cipher { .. }
            | Self::MissingPlayerUrl { .. }
            | Self::MalformedCipher { .. }
            | Self::MissingUrl { .. }
            | Self::Unresolved { .. }
            | Self::SegmentedUnavailable { .. }
            | Self::Segmented { .. } => false,
        }
    }
}
