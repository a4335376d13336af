//! Error types for the transcription pipeline.
//!
//! The variants follow the boundary the service reports to callers:
//! request and download problems are the client's, detection problems are ours.

use std::fmt::Display;
use thiserror::Error;

/// Errors raised while turning a media URL into fretboard notes.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested clip is longer than the configured cap.
    #[error("Duration cannot exceed {max} seconds")]
    DurationExceeded {
        /// Requested duration in seconds.
        requested: u32,
        /// Maximum accepted duration in seconds.
        max: u32,
    },

    /// The source URL is not an http(s) URL.
    #[error("Unsupported URL scheme: {0}")]
    InvalidUrl(String),

    /// Fetching or decoding the source audio failed.
    #[error("Failed to download audio: {0}")]
    Download(String),

    /// The pitch-detection collaborator failed.
    #[error("Transcription failed: {0}")]
    Inference(String),
}

impl Error {
    pub fn download(context: &str, err: impl Display) -> Self {
        Error::Download(format!("{context}: {err}"))
    }

    pub fn inference(context: &str, err: impl Display) -> Self {
        Error::Inference(format!("{context}: {err}"))
    }

    /// Whether the failure was caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Error::Inference(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_message_names_the_cap() {
        let err = Error::DurationExceeded { requested: 61, max: 60 };
        assert_eq!(err.to_string(), "Duration cannot exceed 60 seconds");
        assert!(err.is_client_error());
    }

    #[test]
    fn inference_is_a_server_error() {
        let err = Error::inference("basic-pitch exited", "status 1");
        assert_eq!(err.to_string(), "Transcription failed: basic-pitch exited: status 1");
        assert!(!err.is_client_error());
        assert!(Error::download("yt-dlp", "404").is_client_error());
    }
}
