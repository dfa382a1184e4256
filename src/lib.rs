//! Core library for `parfetch`, a parallel distribution-file fetcher.
//!
//! Given a distinfo manifest (per-file size + SHA-256 digest) and ordered
//! mirror lists, this crate verifies what's already on disk and concurrently
//! downloads what's missing or corrupt, rotating to the next mirror on any
//! failure.
//!
//! # Architecture
//!
//! - [`config`] - environment option loading (the `dp_*` namespace)
//! - [`manifest`] - distinfo manifest model: parse, query, mutate, serialize
//! - [`checksum`] - incremental SHA-256 digests and the checksum policy
//! - [`sites`] - per-group mirror site list construction
//! - [`distfile`] - per-file mirror queue and fetch state
//! - [`download`] - streaming HTTP client, connection governor, fetch engine
//! - [`verify`] - parallel initial verification of already-present files
//! - [`progress`] - 1 Hz progress widget
//! - [`status`] - status-line reporting shared by verify and fetch

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checksum;
pub mod cli;
pub mod config;
pub mod distfile;
pub mod download;
pub mod manifest;
pub mod progress;
pub mod sites;
pub mod status;
pub mod verify;

pub use checksum::IncrementalDigest;
pub use config::{ConfigError, Options, Target};
pub use distfile::{Distfile, SitesType};
pub use download::{DownloadError, FetchEngine, FetchReport};
pub use manifest::{Manifest, ManifestEntry, ManifestError};
pub use status::StatusLog;
pub use verify::{InitialVerifier, VerifyReport};
