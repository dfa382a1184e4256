//! The distinfo manifest: a timestamp plus one size/digest entry per
//! distfile, as read from and written to `DISTINFO_FILE`.
//!
//! ```text
//! TIMESTAMP = 1700000000
//! SHA256 (foo-1.0.tar.gz) = 9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08
//! SIZE (foo-1.0.tar.gz) = 204800
//! ```
//!
//! Entries are kept in an [`IndexMap`] so that iteration order matches
//! insertion order: re-serializing a manifest that was only read, not
//! mutated, reproduces the same entry order it was parsed in.

pub mod error;

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

pub use error::{BadLine, ManifestError};

use crate::checksum;

/// Sentinel for "size not yet known" — used transiently while building a
/// manifest in makesum mode, never written to disk.
pub const UNKNOWN_SIZE: i64 = -1;

#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub filename: String,
    pub size: i64,
    pub digest: Vec<u8>,
}

impl ManifestEntry {
    fn new(filename: String) -> Self {
        Self {
            filename,
            size: UNKNOWN_SIZE,
            digest: Vec::new(),
        }
    }

    pub fn size_known(&self) -> bool {
        self.size >= 0
    }

    pub fn digest_present(&self) -> bool {
        !self.digest.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    timestamp: u64,
    entries: IndexMap<String, ManifestEntry>,
}

static TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^TIMESTAMP\s*=\s*(\d+)$").expect("valid regex"));
static SHA256_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SHA256\s*\(([^)]*)\)\s*=\s*([0-9a-fA-F]+)$").expect("valid regex")
});
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SIZE\s*\(([^)]*)\)\s*=\s*(-?\d+)$").expect("valid regex"));

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamp(timestamp: u64) -> Self {
        Self {
            timestamp,
            entries: IndexMap::new(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Sets the timestamp to the current wall-clock time, the way makesum
    /// mode bumps it whenever a digest changes.
    pub fn bump_timestamp(&mut self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(self.timestamp);
        self.timestamp = now;
    }

    /// Sets the timestamp to the current time only if it is still zero
    /// (i.e. the manifest was freshly parsed and had no `TIMESTAMP` line).
    pub fn ensure_timestamp(&mut self) {
        if self.timestamp == 0 {
            self.bump_timestamp();
        }
    }

    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    pub fn entry_mut(&mut self, name: &str) -> Option<&mut ManifestEntry> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Inserts an entry with the given filename and optional size; the
    /// digest starts empty. Used by makesum mode when a distfile has no
    /// pre-existing distinfo entry.
    pub fn add_entry(&mut self, filename: impl Into<String>, size: Option<i64>) {
        let filename = filename.into();
        let entry = self
            .entries
            .entry(filename.clone())
            .or_insert_with(|| ManifestEntry::new(filename));
        if let Some(size) = size {
            entry.size = size;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a distinfo manifest. Lines that don't match any of the three
    /// known directives are treated as grammar this parser doesn't cover
    /// and silently preserved out of the model (permitted, per spec); lines
    /// that start with a known keyword but are malformed are collected and
    /// reported together as [`ManifestError::Parse`].
    pub fn parse(input: &str) -> Result<Manifest, ManifestError> {
        let mut timestamp = 0u64;
        let mut entries: IndexMap<String, ManifestEntry> = IndexMap::new();
        let mut bad_lines = Vec::new();

        for (idx, line) in input.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(caps) = TIMESTAMP_RE.captures(trimmed) {
                match caps[1].parse::<u64>() {
                    Ok(v) => timestamp = v,
                    Err(_) => bad_lines.push(bad(idx, line)),
                }
                continue;
            }

            if let Some(caps) = SHA256_RE.captures(trimmed) {
                let name = caps[1].to_string();
                match checksum::from_hex(&caps[2]) {
                    Ok(digest) => {
                        entries
                            .entry(name.clone())
                            .or_insert_with(|| ManifestEntry::new(name))
                            .digest = digest;
                    }
                    Err(_) => bad_lines.push(bad(idx, line)),
                }
                continue;
            }

            if let Some(caps) = SIZE_RE.captures(trimmed) {
                let name = caps[1].to_string();
                match caps[2].parse::<i64>() {
                    Ok(size) => {
                        entries
                            .entry(name.clone())
                            .or_insert_with(|| ManifestEntry::new(name))
                            .size = size;
                    }
                    Err(_) => bad_lines.push(bad(idx, line)),
                }
                continue;
            }

            if trimmed.starts_with("TIMESTAMP")
                || trimmed.starts_with("SHA256")
                || trimmed.starts_with("SIZE")
            {
                bad_lines.push(bad(idx, line));
            }
        }

        if !bad_lines.is_empty() {
            return Err(ManifestError::Parse(bad_lines));
        }

        Ok(Manifest { timestamp, entries })
    }

    /// Writes the manifest back out in the same grammar it was parsed from.
    /// Callers are expected to have already ensured every entry has a known
    /// size and non-empty digest before calling this.
    pub fn serialize(&self, mut writer: impl Write) -> std::io::Result<()> {
        writeln!(writer, "TIMESTAMP = {}", self.timestamp)?;
        for entry in self.entries.values() {
            writeln!(
                writer,
                "SHA256 ({}) = {}",
                entry.filename,
                checksum::to_hex(&entry.digest)
            )?;
            writeln!(writer, "SIZE ({}) = {}", entry.filename, entry.size)?;
        }
        Ok(())
    }

    pub fn to_string_repr(&self) -> String {
        let mut buf = Vec::new();
        self.serialize(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("manifest output is always valid utf-8")
    }
}

fn bad(idx: usize, line: &str) -> BadLine {
    BadLine {
        line_number: idx + 1,
        text: line.to_string(),
    }
}
