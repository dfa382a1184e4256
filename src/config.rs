//! Process-wide options resolved once from the `dp_*` environment namespace.
//!
//! `parfetch` takes essentially all of its configuration from environment
//! variables set by the calling build system rather than from command-line
//! flags (the `-d`/`-p` flags in [`crate::cli`] are the only exceptions).
//! [`Options::from_env`] is the single entry point; once built, an
//! `Options` is treated as immutable for the life of the run.

use std::path::PathBuf;

use thiserror::Error;

/// What this invocation is meant to accomplish, from `dp_TARGET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Fetch missing/corrupt distfiles (the default).
    DoFetch,
    /// Only verify already-present distfiles against the manifest.
    Checksum,
    /// Recompute the manifest from the distfiles on disk.
    Makesum,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dp_{0} not set in the environment")]
    MissingEnv(&'static str),
    #[error("unsupported dp_TARGET value: {0:?}")]
    UnsupportedTarget(String),
    #[error("dp_{name} is not a valid number: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Reads `dp_<name>` from the environment, treating an empty value the same
/// as unset (mirrors the original tool's `makevar()` semantics).
pub fn dp_var(name: &str) -> Option<String> {
    std::env::var(format!("dp_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

pub fn dp_flag(name: &str) -> bool {
    dp_var(name).is_some()
}

fn dp_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match dp_var(name) {
        None => Ok(default),
        Some(value) => value
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub target: Target,
    pub distdir: PathBuf,
    pub dist_subdir: Option<String>,
    pub distinfo_file: PathBuf,
    pub makesum: bool,
    pub makesum_ephemeral: bool,
    pub makesum_keep_timestamp: bool,
    pub disable_size: bool,
    pub no_checksum: bool,
    pub randomize_sites: bool,
    pub max_host_connections: u32,
    pub max_total_connections: u32,
    pub master_site_override: Option<String>,
    pub master_site_backup: Option<String>,
    pub fetch_env: Vec<String>,
}

impl Options {
    pub fn from_env() -> Result<Self, ConfigError> {
        let target = match dp_var("TARGET").as_deref() {
            None | Some("do-fetch") => Target::DoFetch,
            Some("checksum") => Target::Checksum,
            Some("makesum") => Target::Makesum,
            Some(other) => return Err(ConfigError::UnsupportedTarget(other.to_string())),
        };

        let distdir = dp_var("DISTDIR")
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingEnv("DISTDIR"))?;
        let distinfo_file = dp_var("DISTINFO_FILE")
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingEnv("DISTINFO_FILE"))?;

        let makesum = dp_flag("_PARFETCH_MAKESUM") || target == Target::Makesum;

        Ok(Self {
            target,
            distdir,
            dist_subdir: dp_var("DIST_SUBDIR"),
            distinfo_file,
            makesum,
            makesum_ephemeral: dp_flag("PARFETCH_MAKESUM_EPHEMERAL"),
            makesum_keep_timestamp: dp_flag("PARFETCH_MAKESUM_KEEP_TIMESTAMP"),
            disable_size: dp_flag("DISABLE_SIZE"),
            no_checksum: dp_flag("NO_CHECKSUM"),
            randomize_sites: dp_flag("RANDOMIZE_SITES"),
            max_host_connections: dp_u32("PARFETCH_MAX_HOST_CONNECTIONS", 1)?,
            max_total_connections: dp_u32("PARFETCH_MAX_TOTAL_CONNECTIONS", 4)?,
            master_site_override: dp_var("MASTER_SITE_OVERRIDE"),
            master_site_backup: dp_var("MASTER_SITE_BACKUP"),
            fetch_env: dp_var("FETCH_ENV")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }

    /// Full path a distfile should live at under DISTDIR, honoring
    /// DIST_SUBDIR.
    pub fn distfile_path(&self, full_name: &str) -> PathBuf {
        self.distdir.join(full_name)
    }

    /// Minimal `Options` for unit tests that only exercise one or two
    /// fields; every boolean defaults false and connection caps default to
    /// `from_env`'s own defaults.
    #[cfg(test)]
    pub fn bare_for_tests() -> Self {
        Self {
            target: Target::DoFetch,
            distdir: PathBuf::from("."),
            dist_subdir: None,
            distinfo_file: PathBuf::from("distinfo"),
            makesum: false,
            makesum_ephemeral: false,
            makesum_keep_timestamp: false,
            disable_size: false,
            no_checksum: false,
            randomize_sites: false,
            max_host_connections: 1,
            max_total_connections: 4,
            master_site_override: None,
            master_site_backup: None,
            fetch_env: Vec::new(),
        }
    }
}

/// Guards a test's mutation of process environment variables, restoring
/// the previous value (or removing the var if it was unset) on drop. Tests
/// that touch `dp_*` env vars run serially under a shared mutex since the
/// process environment is global state.
#[cfg(test)]
pub struct RestoreEnv {
    key: String,
    previous: Option<String>,
}

#[cfg(test)]
impl RestoreEnv {
    pub fn set(key: &str, value: &str) -> Self {
        let previous = std::env::var(key).ok();
        // SAFETY: tests serialize access to process env via ENV_TEST_LOCK.
        unsafe { std::env::set_var(key, value) };
        Self {
            key: key.to_string(),
            previous,
        }
    }
}

#[cfg(test)]
impl Drop for RestoreEnv {
    fn drop(&mut self) {
        match &self.previous {
            // SAFETY: tests serialize access to process env via ENV_TEST_LOCK.
            Some(value) => unsafe { std::env::set_var(&self.key, value) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}
