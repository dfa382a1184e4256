//! Parallel initial verification: before any network request is issued,
//! check which distfiles already present under DISTDIR already satisfy
//! the manifest, so they can be skipped entirely.
//!
//! Work is partitioned round-robin across `cpus + 1` blocking workers
//! (`tokio::task::spawn_blocking`), each reading its assigned files in
//! 64 KiB chunks — the parallel equivalent of the original tool's
//! per-worker sub-loop, minus the hand-rolled event loop, since blocking
//! reads need no reactor.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::Options;
use crate::distfile::Distfile;
use crate::manifest::Manifest;
use crate::status::StatusLog;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub full_name: String,
    pub already_satisfied: bool,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub outcomes: Vec<VerifyOutcome>,
    pub total: usize,
}

impl VerifyReport {
    pub fn satisfied_names(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.already_satisfied)
            .map(|o| o.full_name.as_str())
    }

    pub fn verified_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.already_satisfied).count()
    }

    /// The aggregate summary line the original tool prints once verification
    /// finishes: "all N verified" / "K of N verified" / "none of the N
    /// verified".
    pub fn summary_line(&self) -> String {
        let verified = self.verified_count();
        if self.total == 0 {
            "no distfiles to verify".to_string()
        } else if verified == self.total {
            format!("all {} files verified", self.total)
        } else if verified == 0 {
            format!("none of the {} files verified", self.total)
        } else {
            format!("{} of {} files verified", verified, self.total)
        }
    }
}

pub struct InitialVerifier {
    options: Arc<Options>,
}

impl InitialVerifier {
    pub fn new(options: Arc<Options>) -> Self {
        Self { options }
    }

    pub async fn verify(
        &self,
        distfiles: &[Distfile],
        manifest: Arc<Mutex<Manifest>>,
        status: &StatusLog,
    ) -> VerifyReport {
        let total = distfiles.len();
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            + 1;

        let mut buckets: Vec<Vec<Distfile>> = (0..worker_count).map(|_| Vec::new()).collect();
        for (i, distfile) in distfiles.iter().cloned().enumerate() {
            buckets[i % worker_count].push(distfile);
        }

        let mut handles = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let options = self.options.clone();
            let manifest = manifest.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let mut outcomes = Vec::with_capacity(bucket.len());
                let mut lines = Vec::new();
                for distfile in &bucket {
                    let (outcome, line) = verify_one_blocking(distfile, &options, &manifest);
                    if let Some(line) = line {
                        lines.push(line);
                    }
                    outcomes.push(outcome);
                }
                (outcomes, lines)
            }));
        }

        // Flush each worker's output in submission order, not completion
        // order, so verification output reads the same regardless of which
        // worker happened to finish first.
        let mut outcomes = Vec::with_capacity(total);
        for handle in handles {
            if let Ok((worker_outcomes, worker_lines)) = handle.await {
                if !worker_lines.is_empty() {
                    status.block(&worker_lines);
                }
                outcomes.extend(worker_outcomes);
            }
        }

        let report = VerifyReport { outcomes, total };
        status.verified(&report.summary_line());
        report
    }
}

fn verify_one_blocking(
    distfile: &Distfile,
    options: &Options,
    manifest: &Mutex<Manifest>,
) -> (VerifyOutcome, Option<String>) {
    let full_name = distfile.full_name.clone();
    let path = options.distfile_path(&full_name);

    let not_satisfied = || VerifyOutcome {
        full_name: full_name.clone(),
        already_satisfied: false,
    };

    let metadata = match std::fs::metadata(&path) {
        Ok(m) => m,
        Err(_) => return (not_satisfied(), None),
    };
    let actual_size = metadata.len();

    if options.makesum {
        let digest = match hash_file_blocking(&path) {
            Ok(d) => d,
            Err(_) => return (not_satisfied(), None),
        };
        let mut guard = manifest.blocking_lock();
        guard.add_entry(full_name.clone(), Some(actual_size as i64));
        let changed = guard
            .entry(&full_name)
            .map(|e| e.digest != digest)
            .unwrap_or(true);
        if changed {
            if !options.makesum_keep_timestamp {
                guard.bump_timestamp();
            }
            if let Some(entry) = guard.entry_mut(&full_name) {
                entry.digest = digest;
            }
        }
        return (
            VerifyOutcome {
                full_name: full_name.clone(),
                already_satisfied: true,
            },
            Some(format!("verified {full_name}")),
        );
    }

    if !options.disable_size {
        let expected = manifest.blocking_lock().entry(&full_name).and_then(|e| {
            if e.size_known() {
                Some(e.size as u64)
            } else {
                None
            }
        });
        if let Some(expected) = expected
            && expected != actual_size
        {
            let _ = std::fs::remove_file(&path);
            return (
                not_satisfied(),
                Some(format!(
                    "size mismatch for {full_name} (expected: {expected}, actual: {actual_size})"
                )),
            );
        }
        if expected.is_none() {
            return (not_satisfied(), None);
        }
    }

    if options.no_checksum {
        return (
            VerifyOutcome {
                full_name: full_name.clone(),
                already_satisfied: true,
            },
            Some(format!("verified {full_name}")),
        );
    }

    let digest = match hash_file_blocking(&path) {
        Ok(d) => d,
        Err(_) => return (not_satisfied(), None),
    };
    let matches = manifest
        .blocking_lock()
        .entry(&full_name)
        .map(|e| e.digest == digest)
        .unwrap_or(false);

    if matches {
        (
            VerifyOutcome {
                full_name: full_name.clone(),
                already_satisfied: true,
            },
            Some(format!("verified {full_name}")),
        )
    } else {
        (
            not_satisfied(),
            Some(format!("checksum mismatch for {full_name}")),
        )
    }
}

fn hash_file_blocking(path: &Path) -> std::io::Result<Vec<u8>> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}
