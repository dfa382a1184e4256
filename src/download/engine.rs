//! The fetch orchestrator: one task per distfile, rotating through its
//! mirror queue until it succeeds or runs out of mirrors, bounded by a
//! [`ConnectionGovernor`] across all concurrently running distfiles.
//!
//! This collapses the original libcurl-multi/libevent reactor into plain
//! `tokio::spawn` tasks: each task's `.await` points are exactly the places
//! the C implementation would have yielded back into the multi-handle's
//! event loop, so the per-distfile state machine reads top-to-bottom
//! instead of being split across `handle_socket`/`check_multi_info`
//! callbacks.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;

use super::client::MirrorClient;
use super::error::DownloadError;
use super::governor::ConnectionGovernor;
use crate::checksum::{self, ChecksumOutcome};
use crate::config::Options;
use crate::distfile::Distfile;
use crate::manifest::Manifest;
use crate::progress::ProgressReporter;
use crate::status::StatusLog;

#[derive(Debug, Clone)]
pub struct DistfileResult {
    pub full_name: String,
    pub fetched: bool,
    /// Set when this distfile hit an unrecoverable error (an unsupported
    /// mirror URL scheme) rather than simply exhausting its mirrors.
    pub fatal: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub all_fetched: bool,
    pub results: Vec<DistfileResult>,
    /// The first fatal error seen across all distfiles, if any. A fatal
    /// error aborts the whole run regardless of how the other distfiles
    /// fared.
    pub fatal: Option<String>,
}

#[derive(Clone)]
pub struct FetchEngine {
    client: MirrorClient,
    governor: Arc<ConnectionGovernor>,
    status: StatusLog,
}

impl FetchEngine {
    pub fn new(client: MirrorClient, governor: Arc<ConnectionGovernor>, status: StatusLog) -> Self {
        Self {
            client,
            governor,
            status,
        }
    }

    /// Runs every distfile to completion concurrently and returns once all
    /// of them have either fetched or exhausted their mirrors.
    #[instrument(skip_all, fields(count = distfiles.len()))]
    pub async fn run(
        &self,
        distfiles: Vec<Distfile>,
        manifest: Arc<Mutex<Manifest>>,
        options: Arc<Options>,
        progress: Arc<ProgressReporter>,
    ) -> FetchReport {
        let mut tasks = Vec::with_capacity(distfiles.len());

        for distfile in distfiles {
            let client = self.client.clone();
            let governor = self.governor.clone();
            let status = self.status.clone();
            let manifest = manifest.clone();
            let options = options.clone();
            let progress = progress.clone();

            tasks.push(tokio::spawn(async move {
                fetch_one(distfile, &client, &governor, &manifest, &options, &status, &progress).await
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    tracing::error!(%join_error, "fetch task panicked");
                }
            }
        }

        let all_fetched = !results.is_empty() && results.iter().all(|r| r.fetched);
        let fatal = results.iter().find_map(|r| r.fatal.clone());
        FetchReport {
            all_fetched,
            results,
            fatal,
        }
    }
}

/// Runs one distfile's mirror state machine to completion: idle -> in
/// flight -> succeeded, or in flight -> failed -> next mirror, repeating
/// until success or mirror exhaustion. At most one attempt is in flight
/// for this distfile at any time, since this whole function body runs
/// sequentially inside a single task.
#[instrument(skip_all, fields(distfile = %distfile.full_name))]
async fn fetch_one(
    mut distfile: Distfile,
    client: &MirrorClient,
    governor: &ConnectionGovernor,
    manifest: &Mutex<Manifest>,
    options: &Options,
    status: &StatusLog,
    progress: &ProgressReporter,
) -> DistfileResult {
    loop {
        let Some(attempt) = distfile.next_attempt() else {
            status.no_more_mirrors(&distfile.full_name);
            return DistfileResult {
                full_name: distfile.full_name,
                fetched: false,
                fatal: None,
            };
        };

        status.queued(&attempt.url);
        progress.set_current_file(&distfile.full_name);

        let host = url::Url::parse(&attempt.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        let _permit = governor.acquire(&host).await;

        let sink_path = options.distfile_path(&distfile.full_name);
        let mut sink_file = if options.makesum_ephemeral {
            None
        } else {
            if let Some(parent) = sink_path.parent() {
                if let Err(source) = tokio::fs::create_dir_all(parent).await {
                    status.error(
                        &attempt.url,
                        &format!("could not create {}: {source}", parent.display()),
                    );
                    continue;
                }
            }

            match tokio::fs::File::create(&sink_path).await {
                Ok(f) => Some(f),
                Err(source) => {
                    status.error(
                        &attempt.url,
                        &format!("could not create {}: {source}", sink_path.display()),
                    );
                    continue;
                }
            }
        };

        let expected_size = manifest
            .lock()
            .await
            .entry(&distfile.full_name)
            .filter(|e| e.size_known())
            .map(|e| e.size as u64);
        let max_size = if options.disable_size { None } else { expected_size };

        let mut bytes_seen: u64 = 0;
        let fetch_result = client
            .fetch(
                &attempt.url,
                sink_file.as_mut(),
                &sink_path,
                max_size,
                |n| {
                    bytes_seen += n;
                    progress.add(n);
                },
            )
            .await;
        drop(sink_file);

        let outcome = match fetch_result {
            Ok(outcome) => outcome,
            Err(error @ DownloadError::UnsupportedProtocol { .. }) => {
                progress.retreat(bytes_seen);
                unlink_sink(options, &sink_path).await;
                status.error(&attempt.url, &error.to_string());
                return DistfileResult {
                    full_name: distfile.full_name,
                    fetched: false,
                    fatal: Some(error.to_string()),
                };
            }
            Err(error) => {
                progress.retreat(bytes_seen);
                unlink_sink(options, &sink_path).await;
                status.error(&attempt.url, &error.to_string());
                continue;
            }
        };

        if options.makesum {
            // makesum overwrites whatever the manifest currently says, so
            // the observed size always wins here regardless of
            // DISABLE_SIZE: adopt it, and bump the timestamp only if it
            // actually changed (the digest below follows the same rule).
            let mut guard = manifest.lock().await;
            let changed = guard
                .entry(&distfile.full_name)
                .is_none_or(|e| e.size != outcome.bytes_written as i64);
            guard.add_entry(
                distfile.full_name.clone(),
                Some(outcome.bytes_written as i64),
            );
            if changed && !options.makesum_keep_timestamp {
                guard.bump_timestamp();
            }
        } else if !options.disable_size
            && let Some(expected) = expected_size
            && outcome.bytes_written != expected
        {
            status.size_mismatch(&distfile.full_name, expected as i64, outcome.bytes_written);
            progress.retreat(outcome.bytes_written);
            unlink_sink(options, &sink_path).await;
            status.unlink(&distfile.full_name);
            continue;
        }

        match checksum::check_checksum(manifest, &distfile.full_name, outcome.digest, options).await {
            Ok(ChecksumOutcome::Accepted) => {
                // The bar's total was seeded from whatever size was already
                // known for this distfile (0 if none was). Reconcile it
                // against what was actually observed: a no-op outside
                // makesum, since the size-mismatch branch above already
                // rejected any non-makesum attempt whose size disagreed, but
                // in makesum mode the observed size can differ from a stale
                // manifest entry in either direction.
                let previous = expected_size.map(|s| s as i64).unwrap_or(0);
                progress.adjust_total(outcome.bytes_written as i64 - previous);
                status.done(&distfile.full_name);
                distfile.fetched = true;
                return DistfileResult {
                    full_name: distfile.full_name,
                    fetched: true,
                    fatal: None,
                };
            }
            Ok(ChecksumOutcome::Mismatch) => {
                status.checksum_mismatch(&distfile.full_name);
                progress.retreat(outcome.bytes_written);
                unlink_sink(options, &sink_path).await;
                status.unlink(&distfile.full_name);
            }
            Err(error) => {
                status.failed(&error.to_string());
                return DistfileResult {
                    full_name: distfile.full_name,
                    fetched: false,
                    fatal: None,
                };
            }
        }
    }
}

/// Best-effort unlink of a partial sink on a failed attempt. A no-op in
/// makesum-ephemeral mode, since no sink was ever created on disk.
async fn unlink_sink(options: &Options, sink_path: &std::path::Path) {
    if options.makesum_ephemeral {
        return;
    }
    let _ = tokio::fs::remove_file(sink_path).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distfile::SitesType;
    use crate::download::client::TlsPolicy;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_options(distdir: std::path::PathBuf) -> Options {
        Options {
            target: crate::config::Target::DoFetch,
            distdir,
            dist_subdir: None,
            distinfo_file: std::path::PathBuf::from("distinfo"),
            makesum: false,
            makesum_ephemeral: false,
            makesum_keep_timestamp: false,
            disable_size: false,
            no_checksum: false,
            randomize_sites: false,
            max_host_connections: 4,
            max_total_connections: 4,
            master_site_override: None,
            master_site_backup: None,
            fetch_env: Vec::new(),
        }
    }

    #[tokio::test]
    async fn happy_path_fetches_on_first_mirror() {
        let server = MockServer::start().await;
        let body = b"hello distfile".to_vec();
        Mock::given(method("GET"))
            .and(path("/foo.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let options = Arc::new(test_options(tmp.path().to_path_buf()));

        let mut digest = crate::checksum::IncrementalDigest::new();
        digest.update(&body);
        let digest = digest.finalize();

        let mut manifest = Manifest::with_timestamp(1);
        manifest.add_entry("foo.tar.gz", Some(body.len() as i64));
        manifest.entry_mut("foo.tar.gz").unwrap().digest = digest;
        let manifest = Arc::new(Mutex::new(manifest));

        let mut distfile = Distfile::new(
            SitesType::Master,
            "foo.tar.gz".to_string(),
            "foo.tar.gz".to_string(),
            vec!["DEFAULT".to_string()],
        );
        distfile.push_site(&server.uri());

        let client = MirrorClient::new(TlsPolicy::default()).unwrap();
        let governor = Arc::new(ConnectionGovernor::new(4, 4));
        let status = StatusLog::new(Box::new(std::io::sink()));
        let progress = Arc::new(ProgressReporter::new(body.len() as u64, true));

        let engine = FetchEngine::new(client, governor, status);
        let report = engine
            .run(vec![distfile], manifest.clone(), options, progress)
            .await;

        assert!(report.all_fetched);
        assert!(report.results[0].fetched);
        assert!(manifest.lock().await.entry("foo.tar.gz").is_some());
    }

    #[tokio::test]
    async fn rotates_to_next_mirror_on_checksum_mismatch() {
        let bad_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/foo.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"wrong bytes".to_vec()))
            .mount(&bad_server)
            .await;

        let good_server = MockServer::start().await;
        let body = b"correct bytes".to_vec();
        Mock::given(method("GET"))
            .and(path("/foo.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&good_server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let options = Arc::new(test_options(tmp.path().to_path_buf()));

        let mut digest = crate::checksum::IncrementalDigest::new();
        digest.update(&body);
        let digest = digest.finalize();

        let mut manifest = Manifest::with_timestamp(1);
        manifest.add_entry("foo.tar.gz", Some(body.len() as i64));
        manifest.entry_mut("foo.tar.gz").unwrap().digest = digest;
        let manifest = Arc::new(Mutex::new(manifest));

        let mut distfile = Distfile::new(
            SitesType::Master,
            "foo.tar.gz".to_string(),
            "foo.tar.gz".to_string(),
            vec!["DEFAULT".to_string()],
        );
        distfile.push_site(&bad_server.uri());
        distfile.push_site(&good_server.uri());

        let client = MirrorClient::new(TlsPolicy::default()).unwrap();
        let governor = Arc::new(ConnectionGovernor::new(4, 4));
        let status = StatusLog::new(Box::new(std::io::sink()));
        let progress = Arc::new(ProgressReporter::new(body.len() as u64, true));

        let engine = FetchEngine::new(client, governor, status);
        let report = engine
            .run(vec![distfile], manifest, options, progress)
            .await;

        assert!(report.all_fetched);
    }

    #[tokio::test]
    async fn exhausting_mirrors_reports_not_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.tar.gz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let options = Arc::new(test_options(tmp.path().to_path_buf()));

        let mut manifest = Manifest::with_timestamp(1);
        manifest.add_entry("missing.tar.gz", Some(10));
        let manifest = Arc::new(Mutex::new(manifest));

        let mut distfile = Distfile::new(
            SitesType::Master,
            "missing.tar.gz".to_string(),
            "missing.tar.gz".to_string(),
            vec!["DEFAULT".to_string()],
        );
        distfile.push_site(&server.uri());

        let client = MirrorClient::new(TlsPolicy::default()).unwrap();
        let governor = Arc::new(ConnectionGovernor::new(4, 4));
        let status = StatusLog::new(Box::new(std::io::sink()));
        let progress = Arc::new(ProgressReporter::new(10, true));

        let engine = FetchEngine::new(client, governor, status);
        let report = engine
            .run(vec![distfile], manifest, options, progress)
            .await;

        assert!(!report.all_fetched);
        assert!(!report.results[0].fetched);
    }

    #[tokio::test]
    async fn unsupported_protocol_is_fatal_and_does_not_rotate() {
        let good_server = MockServer::start().await;
        let body = b"hello distfile".to_vec();
        Mock::given(method("GET"))
            .and(path("/foo.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&good_server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let options = Arc::new(test_options(tmp.path().to_path_buf()));

        let mut manifest = Manifest::with_timestamp(1);
        manifest.add_entry("foo.tar.gz", Some(body.len() as i64));
        let manifest = Arc::new(Mutex::new(manifest));

        let mut distfile = Distfile::new(
            SitesType::Master,
            "foo.tar.gz".to_string(),
            "foo.tar.gz".to_string(),
            vec!["DEFAULT".to_string()],
        );
        distfile.push_site("ftp://example.com");
        // A working mirror follows the unsupported one; it must never be
        // tried, since an unsupported protocol aborts the whole distfile
        // rather than rotating to the next mirror.
        distfile.push_site(&good_server.uri());

        let client = MirrorClient::new(TlsPolicy::default()).unwrap();
        let governor = Arc::new(ConnectionGovernor::new(4, 4));
        let status = StatusLog::new(Box::new(std::io::sink()));
        let progress = Arc::new(ProgressReporter::new(body.len() as u64, true));

        let engine = FetchEngine::new(client, governor, status);
        let report = engine
            .run(vec![distfile], manifest, options, progress)
            .await;

        assert!(!report.all_fetched);
        assert!(!report.results[0].fetched);
        assert!(report.fatal.is_some());
        assert!(report.fatal.as_ref().unwrap().contains("ftp"));
    }

    #[tokio::test]
    async fn ephemeral_makesum_never_writes_to_disk() {
        let server = MockServer::start().await;
        let body = b"abcd".to_vec();
        Mock::given(method("GET"))
            .and(path("/foo.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut options = test_options(tmp.path().to_path_buf());
        options.makesum = true;
        options.makesum_ephemeral = true;
        let options = Arc::new(options);

        let manifest = Arc::new(Mutex::new(Manifest::with_timestamp(1)));

        let mut distfile = Distfile::new(
            SitesType::Master,
            "foo.tar.gz".to_string(),
            "foo.tar.gz".to_string(),
            vec!["DEFAULT".to_string()],
        );
        distfile.push_site(&server.uri());

        let client = MirrorClient::new(TlsPolicy::default()).unwrap();
        let governor = Arc::new(ConnectionGovernor::new(4, 4));
        let status = StatusLog::new(Box::new(std::io::sink()));
        let progress = Arc::new(ProgressReporter::new(0, true));

        let engine = FetchEngine::new(client, governor, status);
        let report = engine
            .run(vec![distfile], manifest.clone(), options, progress)
            .await;

        assert!(report.all_fetched);
        assert!(!tmp.path().join("foo.tar.gz").exists());
        let guard = manifest.lock().await;
        let entry = guard.entry("foo.tar.gz").unwrap();
        assert_eq!(entry.size, body.len() as i64);
        assert!(entry.digest_present());
    }

    #[tokio::test]
    async fn makesum_reconciles_progress_total_against_stale_recorded_size() {
        let server = MockServer::start().await;
        let body = b"a shorter body".to_vec();
        Mock::given(method("GET"))
            .and(path("/foo.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let mut options = test_options(tmp.path().to_path_buf());
        options.makesum = true;
        let options = Arc::new(options);

        // distinfo still records a much larger size from a stale fetch; the
        // bar was seeded from it, and a makesum rerun must shrink the total
        // down to what this run actually observed rather than leave it
        // pinned at the old value.
        let stale_size = body.len() as i64 + 1000;
        let mut manifest = Manifest::with_timestamp(1);
        manifest.add_entry("foo.tar.gz", Some(stale_size));
        let manifest = Arc::new(Mutex::new(manifest));

        let mut distfile = Distfile::new(
            SitesType::Master,
            "foo.tar.gz".to_string(),
            "foo.tar.gz".to_string(),
            vec!["DEFAULT".to_string()],
        );
        distfile.push_site(&server.uri());

        let client = MirrorClient::new(TlsPolicy::default()).unwrap();
        let governor = Arc::new(ConnectionGovernor::new(4, 4));
        let status = StatusLog::new(Box::new(std::io::sink()));
        let progress = Arc::new(ProgressReporter::new(stale_size as u64, true));

        let engine = FetchEngine::new(client, governor, status);
        let report = engine
            .run(vec![distfile], manifest.clone(), options, progress.clone())
            .await;

        assert!(report.all_fetched);
        assert_eq!(progress.current_total(), Some(body.len() as u64));
        let guard = manifest.lock().await;
        assert_eq!(guard.entry("foo.tar.gz").unwrap().size, body.len() as i64);
    }
}
