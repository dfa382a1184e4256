//! Error types for the download module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors a single mirror attempt can fail with. None of these are
/// retried against the same URL — the engine always moves to the next
/// mirror (or gives up) on any of them.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// DNS resolution, connection refused, TLS handshake failure, or the
    /// connection was dropped mid-transfer.
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response's final status code (after following redirects) was
    /// not an acceptable one for the scheme.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// The URL's scheme isn't one this client can fetch. FTP/FTPS mirrors
    /// fall into this path too, since the stack has no FTP client.
    #[error("unsupported protocol {scheme:?} for {url}")]
    UnsupportedProtocol { url: String, scheme: String },

    /// Filesystem error opening, writing, or removing the sink file.
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transfer exceeded the expected size before completing (only applied
    /// when the expected size is known and `DISABLE_SIZE` is unset).
    #[error("maximum file size exceeded for {url} (limit {limit} bytes)")]
    MaxSizeExceeded { url: String, limit: u64 },

    /// The URL could not even be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },
}

impl DownloadError {
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn unsupported_protocol(url: impl Into<String>, scheme: impl Into<String>) -> Self {
        Self::UnsupportedProtocol {
            url: url.into(),
            scheme: scheme.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn max_size_exceeded(url: impl Into<String>, limit: u64) -> Self {
        Self::MaxSizeExceeded {
            url: url.into(),
            limit,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

// We intentionally do not implement `From<reqwest::Error>` or
// `From<std::io::Error>` because every variant needs the URL or path the
// source error doesn't carry; the constructor methods above are the entry
// point callers are expected to use instead.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_display_contains_status_and_url() {
        let error = DownloadError::http_status("https://example.com/file.tar.gz", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("https://example.com/file.tar.gz"));
    }

    #[test]
    fn unsupported_protocol_names_the_scheme() {
        let error = DownloadError::unsupported_protocol("ftp://example.com/file.tar.gz", "ftp");
        assert!(error.to_string().contains("ftp"));
    }

    #[test]
    fn io_display_contains_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/test.tar.gz"), io_error);
        assert!(error.to_string().contains("/tmp/test.tar.gz"));
    }

    #[test]
    fn invalid_url_display_contains_url() {
        let error = DownloadError::invalid_url("not-a-url");
        assert!(error.to_string().contains("not-a-url"));
    }

    #[test]
    fn max_size_exceeded_names_limit() {
        let error = DownloadError::max_size_exceeded("https://example.com/f", 1024);
        assert!(error.to_string().contains("1024"));
    }
}
