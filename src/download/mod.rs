//! Streaming mirror fetcher: HTTP client, connection governor, and the
//! fetch orchestrator built on top of them.
//!
//! # Example
//!
//! ```no_run
//! use parfetch_core::download::{ConnectionGovernor, FetchEngine, MirrorClient, TlsPolicy};
//! use parfetch_core::status::StatusLog;
//! use std::sync::Arc;
//!
//! let client = MirrorClient::new(TlsPolicy::default())?;
//! let governor = Arc::new(ConnectionGovernor::new(4, 1));
//! let engine = FetchEngine::new(client, governor, StatusLog::stdout());
//! # Ok::<(), reqwest::Error>(())
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod governor;

pub use client::{tls_policy_from_fetch_env, MirrorClient, StreamOutcome, TlsPolicy};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use engine::{DistfileResult, FetchEngine, FetchReport};
pub use error::DownloadError;
pub use governor::ConnectionGovernor;
