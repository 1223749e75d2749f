//! Failure taxonomy shared by every remote-facing component.

use thiserror::Error;

/// Failure of one outbound request to a catalog, geocoding or tile service.
///
/// `Clone` so a single in-flight failure can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, timeout or body-read failure.
    #[error("network error: {0}")]
    Network(String),
    /// The service answered with a non-success status code.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    /// The payload could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// The geocoding service returned no match.
    #[error("no match found")]
    NotFound,
}

/// Payload-free discriminant of [`FetchError`], published in enrichment events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Network,
    HttpStatus,
    Decode,
    NotFound,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network(_) => FetchErrorKind::Network,
            Self::HttpStatus(_) => FetchErrorKind::HttpStatus,
            Self::Decode(_) => FetchErrorKind::Decode,
            Self::NotFound => FetchErrorKind::NotFound,
        }
    }
}

/// Failure of an explicit favorites backup/restore request.
///
/// Regular write-through saves never surface errors; only file operations the
/// user asked for do.
#[derive(Debug, Error)]
pub enum FavoritesError {
    #[error("favorites file I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("favorites file {path} is not a JSON array of ids: {source}")]
    Format {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::{FetchError, FetchErrorKind};

    #[test]
    fn test_kind_strips_payload() {
        assert_eq!(
            FetchError::Network("reset".to_string()).kind(),
            FetchErrorKind::Network
        );
        assert_eq!(FetchError::HttpStatus(503).kind(), FetchErrorKind::HttpStatus);
        assert_eq!(FetchError::NotFound.kind(), FetchErrorKind::NotFound);
    }

    #[test]
    fn test_display_includes_status_code() {
        assert_eq!(
            FetchError::HttpStatus(429).to_string(),
            "unexpected HTTP status 429"
        );
    }
}
