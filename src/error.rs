//! Error types for the flag-quiz library.

use std::fmt;

use thiserror::Error;

/// The kind of asset that could not be resolved from any source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// The country list.
    CountryList,
    /// A flag image.
    FlagImage,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountryList => f.write_str("country list"),
            Self::FlagImage => f.write_str("flag image"),
        }
    }
}

/// Errors that can occur while resolving, caching or prefetching assets.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// A response arrived with a non-success status.
    #[error("Unexpected HTTP status {status} for {url}")]
    Status {
        /// Requested URL.
        url: String,
        /// Status code returned by the server.
        status: u16,
    },

    /// Neither the local nor the remote source could provide the asset.
    #[error("Missing {kind}: {key}")]
    MissingAsset {
        /// Which asset was requested.
        kind: AssetKind,
        /// Identifier of the asset (country code or list path).
        key: String,
    },

    /// A URL could not be parsed.
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// A country code that is not two uppercase ASCII letters.
    #[error("Invalid country code: {0:?}")]
    InvalidCode(String),

    /// A game could not be set up from the available countries.
    #[error("Game error: {0}")]
    Game(String),

    /// Operation was cancelled by the user.
    #[error("Operation cancelled")]
    Cancelled,
}

/// A specialized `Result` type for flag-quiz operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_asset_message_names_kind_and_key() {
        let err = Error::MissingAsset {
            kind: AssetKind::FlagImage,
            key: "FR".to_string(),
        };
        assert_eq!(err.to_string(), "Missing flag image: FR");
    }

    #[test]
    fn status_message_includes_url() {
        let err = Error::Status {
            url: "https://flagcdn.com/fr.svg".to_string(),
            status: 404,
        };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("flagcdn.com"));
    }
}
