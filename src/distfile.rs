//! In-memory model of a single distfile's mirror queue and fetch state.

use std::collections::VecDeque;

/// Which environment namespace (`_MASTER_SITES_*` or `_PATCH_SITES_*`) a
/// distfile's site groups are resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitesType {
    Master,
    Patch,
}

/// One not-yet-tried mirror URL, built by joining a site with the
/// distfile's name.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub url: String,
}

/// A distfile to fetch or verify: its name, the site groups its mirrors
/// come from, and the queue of URLs still to try.
#[derive(Debug, Clone)]
pub struct Distfile {
    pub sites_type: SitesType,
    /// Name as it appears in the manifest and on disk under DISTDIR (may
    /// include a `DIST_SUBDIR` prefix).
    pub full_name: String,
    /// Bare distfile name (no subdir prefix) used to build mirror URLs.
    pub name: String,
    pub groups: Vec<String>,
    pub queue: VecDeque<Attempt>,
    pub fetched: bool,
}

impl Distfile {
    pub fn new(sites_type: SitesType, name: String, full_name: String, groups: Vec<String>) -> Self {
        Self {
            sites_type,
            full_name,
            name,
            groups,
            queue: VecDeque::new(),
            fetched: false,
        }
    }

    pub fn push_site(&mut self, site: &str) {
        let url = join_site_and_name(site, &self.name);
        self.queue.push_back(Attempt { url });
    }

    pub fn next_attempt(&mut self) -> Option<Attempt> {
        self.queue.pop_front()
    }

    pub fn has_more_mirrors(&self) -> bool {
        !self.queue.is_empty()
    }
}

fn join_site_and_name(site: &str, name: &str) -> String {
    if site.ends_with('/') {
        format!("{site}{name}")
    } else {
        format!("{site}/{name}")
    }
}

/// Parses a `-d`/`-p` CLI argument of the form `name[:group1,group2,...]`.
/// An argument with no `:` uses the default group list `["DEFAULT"]`.
pub fn parse_distfile_spec(spec: &str) -> (String, Vec<String>) {
    match spec.split_once(':') {
        Some((name, groups)) => {
            let groups = groups
                .split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>();
            let groups = if groups.is_empty() {
                vec!["DEFAULT".to_string()]
            } else {
                groups
            };
            (name.to_string(), groups)
        }
        None => (spec.to_string(), vec!["DEFAULT".to_string()]),
    }
}
