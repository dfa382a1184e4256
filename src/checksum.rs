//! Incremental SHA-256 digests and the checksum acceptance policy.
//!
//! Every attempt owns one [`IncrementalDigest`], fed a chunk at a time as
//! bytes arrive from the network (or are read back off disk during initial
//! verification). [`check_checksum`] is the single place that decides
//! whether a computed digest satisfies the manifest, and how makesum mode
//! mutates the manifest when it doesn't.

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::Options;
use crate::manifest::Manifest;

/// A SHA-256 digest accumulated one chunk at a time.
///
/// Dropped and replaced (never reused in place) when an attempt moves to the
/// next mirror, so there's no risk of carrying bytes over from a failed
/// attempt.
#[derive(Default)]
pub struct IncrementalDigest(Sha256);

impl IncrementalDigest {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

/// Hex-encodes a digest the way distinfo entries store it (lowercase).
pub fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, thiserror::Error)]
#[error("invalid hex digest: {0}")]
pub struct FromHexError(String);

/// Decodes a hex digest as it appears in a `SHA256 (name) = <hex>` line.
pub fn from_hex(s: &str) -> Result<Vec<u8>, FromHexError> {
    if s.len() % 2 != 0 {
        return Err(FromHexError(s.to_string()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| FromHexError(s.to_string())))
        .collect()
}

/// Outcome of reconciling a computed digest against the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumOutcome {
    /// Digest matched, or checking was disabled.
    Accepted,
    /// Digest did not match a pre-existing manifest entry.
    Mismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// `NO_CHECKSUM` is unset and no manifest entry exists for this file.
    /// Fatal: the manifest was supposed to carry a checksum for it.
    #[error("distinfo has no entry for {0} and checksumming is not disabled")]
    MissingEntry(String),
}

/// Applies the checksum acceptance policy to a freshly computed digest.
///
/// In makesum mode this always accepts and adopts the observed digest into
/// the manifest, bumping the timestamp unless it already matched or
/// `PARFETCH_MAKESUM_KEEP_TIMESTAMP` is set. Outside makesum mode it's a
/// pass/fail comparison against the existing entry.
pub async fn check_checksum(
    manifest: &Mutex<Manifest>,
    full_name: &str,
    computed: Vec<u8>,
    options: &Options,
) -> Result<ChecksumOutcome, ChecksumError> {
    if options.no_checksum && !options.makesum {
        return Ok(ChecksumOutcome::Accepted);
    }

    let mut guard = manifest.lock().await;
    let Some(entry) = guard.entry_mut(full_name) else {
        return Err(ChecksumError::MissingEntry(full_name.to_string()));
    };

    if options.makesum {
        if entry.digest != computed {
            if !options.makesum_keep_timestamp {
                guard.bump_timestamp();
            }
            guard
                .entry_mut(full_name)
                .expect("entry just looked up")
                .digest = computed;
        }
        return Ok(ChecksumOutcome::Accepted);
    }

    if entry.digest == computed {
        Ok(ChecksumOutcome::Accepted)
    } else {
        Ok(ChecksumOutcome::Mismatch)
    }
}
