//! A minimal streaming HTTP client for mirror fetches.
//!
//! Each attempt is a single GET with no resume, no range requests, and no
//! cookie jar — the manifest already tells us the expected name, size, and
//! digest, so there's nothing server-supplied to negotiate. The response
//! body is streamed straight to the sink file, one chunk at a time, while
//! the same chunk is fed into the attempt's digest.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, ClientBuilder};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::checksum::IncrementalDigest;

const USER_AGENT: &str = concat!("parfetch/", env!("CARGO_PKG_VERSION"));

/// FETCH_ENV tokens recognized as TLS-verification overrides. Verification
/// is disabled when the token equals one of these exact strings.
const SSL_NO_VERIFY_PEER: &str = "SSL_NO_VERIFY_PEER=1";
const SSL_NO_VERIFY_HOSTNAME: &str = "SSL_NO_VERIFY_HOSTNAME=1";

#[derive(Debug, Clone, Copy, Default)]
pub struct TlsPolicy {
    pub accept_invalid_certs: bool,
    pub accept_invalid_hostnames: bool,
}

/// Derives the TLS verification policy from `FETCH_ENV` tokens.
pub fn tls_policy_from_fetch_env(fetch_env: &[String]) -> TlsPolicy {
    TlsPolicy {
        accept_invalid_certs: fetch_env.iter().any(|t| t == SSL_NO_VERIFY_PEER),
        accept_invalid_hostnames: fetch_env.iter().any(|t| t == SSL_NO_VERIFY_HOSTNAME),
    }
}

#[derive(Clone)]
pub struct MirrorClient {
    client: Client,
}

pub struct StreamOutcome {
    pub bytes_written: u64,
    pub digest: Vec<u8>,
}

impl MirrorClient {
    pub fn new(tls_policy: TlsPolicy) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(tls_policy)?,
        })
    }

    /// Fetches one URL, streaming the response body into `sink` (when
    /// present) while feeding each chunk into a fresh digest. Returns the
    /// bytes written and final digest on success; the sink is left with
    /// whatever was written so far on failure (the caller is responsible
    /// for truncating/removing it).
    ///
    /// `sink` is `None` in makesum-ephemeral mode: bytes are fed only to
    /// the digest, nothing touches disk.
    ///
    /// `max_size` enforces a size ceiling: when the expected size is known
    /// and `DISABLE_SIZE` is unset, the transfer aborts as soon as it would
    /// exceed that many bytes, rather than downloading the whole
    /// (wrong-sized) body.
    pub async fn fetch(
        &self,
        url: &str,
        sink: Option<&mut File>,
        sink_path: &Path,
        max_size: Option<u64>,
        mut on_chunk: impl FnMut(u64),
    ) -> Result<StreamOutcome, DownloadError> {
        let parsed = url::Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(DownloadError::unsupported_protocol(
                url,
                parsed.scheme().to_string(),
            ));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let mut writer = sink.map(BufWriter::new);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;
        let mut digest = IncrementalDigest::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::transport(url, e))?;

            bytes_written += chunk.len() as u64;
            if let Some(limit) = max_size
                && bytes_written > limit
            {
                return Err(DownloadError::max_size_exceeded(url, limit));
            }

            if let Some(writer) = writer.as_mut() {
                writer
                    .write_all(&chunk)
                    .await
                    .map_err(|e| DownloadError::io(sink_path, e))?;
            }
            digest.update(&chunk);
            on_chunk(chunk.len() as u64);
        }

        if let Some(writer) = writer.as_mut() {
            writer
                .flush()
                .await
                .map_err(|e| DownloadError::io(sink_path, e))?;
        }

        Ok(StreamOutcome {
            bytes_written,
            digest: digest.finalize(),
        })
    }
}

fn build_client(tls_policy: TlsPolicy) -> Result<Client, reqwest::Error> {
    base_client_builder(tls_policy).build()
}

fn base_client_builder(tls_policy: TlsPolicy) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .gzip(true)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(tls_policy.accept_invalid_certs)
        .danger_accept_invalid_hostnames(tls_policy.accept_invalid_hostnames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_env_equality_enables_policy() {
        let policy = tls_policy_from_fetch_env(&[
            "SSL_NO_VERIFY_PEER=1".to_string(),
            "SOME_OTHER=1".to_string(),
        ]);
        assert!(policy.accept_invalid_certs);
        assert!(!policy.accept_invalid_hostnames);
    }

    #[test]
    fn fetch_env_without_token_disables_policy() {
        let policy = tls_policy_from_fetch_env(&["SSL_NO_VERIFY_PEER=0".to_string()]);
        assert!(!policy.accept_invalid_certs);
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected_before_any_request() {
        let client = MirrorClient::new(TlsPolicy::default()).unwrap();
        let mut file = tokio::fs::File::from_std(tempfile::tempfile().unwrap());
        let err = client
            .fetch(
                "ftp://example.com/foo.tar.gz",
                Some(&mut file),
                Path::new("/tmp/foo.tar.gz"),
                None,
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::UnsupportedProtocol { .. }));
    }

    #[tokio::test]
    async fn ephemeral_fetch_with_no_sink_only_computes_digest() {
        let server = wiremock::MockServer::start().await;
        let body = b"abcd".to_vec();
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let client = MirrorClient::new(TlsPolicy::default()).unwrap();
        let mut seen = 0u64;
        let outcome = client
            .fetch(
                &format!("{}/abcd", server.uri()),
                None,
                Path::new("/tmp/abcd"),
                None,
                |n| seen += n,
            )
            .await
            .unwrap();

        assert_eq!(outcome.bytes_written, 4);
        assert_eq!(seen, 4);
        let mut digest = IncrementalDigest::new();
        digest.update(&body);
        assert_eq!(outcome.digest, digest.finalize());
    }
}
