//! Timeout constants for the mirror HTTP client.

/// HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// HTTP read/total timeout per attempt (5 minutes, enough for large
/// distfiles over a slow mirror).
pub const READ_TIMEOUT_SECS: u64 = 300;
