//! Per-group mirror site list construction.
//!
//! A distfile's mirror list is assembled, in order: `MASTER_SITE_OVERRIDE`
//! (if set, short-circuits everything else), then the sites named by each
//! of the distfile's groups (`_MASTER_SITES_<group>` / `_PATCH_SITES_<group>`,
//! each required to be set), then `MASTER_SITE_BACKUP`, optionally shuffled
//! as a whole when `RANDOMIZE_SITES` is set.

use rand::seq::SliceRandom;
use thiserror::Error;

use crate::config::{dp_var, Options};
use crate::distfile::SitesType;

#[derive(Debug, Error)]
pub enum SitesError {
    #[error("dp_{0} not set for group {1:?}")]
    MissingGroup(&'static str, String),
}

/// Builds the ordered mirror site list for one distfile's groups.
pub fn build_site_list(
    sites_type: SitesType,
    groups: &[String],
    options: &Options,
) -> Result<Vec<String>, SitesError> {
    let mut sites = Vec::new();

    if let Some(override_site) = &options.master_site_override {
        sites.push(override_site.clone());
    } else {
        let prefix: &'static str = match sites_type {
            SitesType::Master => "_MASTER_SITES_",
            SitesType::Patch => "_PATCH_SITES_",
        };
        for group in groups {
            let var = format!("{prefix}{group}");
            let value =
                dp_var(&var).ok_or_else(|| SitesError::MissingGroup(prefix, group.clone()))?;
            sites.extend(value.split_whitespace().map(str::to_string));
        }

        if let Some(backup) = &options.master_site_backup {
            sites.extend(backup.split_whitespace().map(str::to_string));
        }
    }

    if options.randomize_sites {
        sites.shuffle(&mut rand::thread_rng());
    }

    Ok(sites)
}
