//! CLI entry point for `parfetch`.
//!
//! Wires the library's modules together end to end: load options,
//! create/enter DISTDIR, load the manifest, parse the `-d`/`-p` arguments
//! into distfiles with mirror queues, run the parallel initial verifier,
//! fetch whatever's still missing, then (in makesum mode, on success)
//! rewrite the manifest.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{debug, info};

use parfetch_core::cli::Args;
use parfetch_core::config::Options;
use parfetch_core::distfile::{parse_distfile_spec, Distfile, SitesType};
use parfetch_core::download::{
    tls_policy_from_fetch_env, ConnectionGovernor, FetchEngine, FetchReport,
};
use parfetch_core::manifest::{Manifest, ManifestError};
use parfetch_core::progress::ProgressReporter;
use parfetch_core::sites::build_site_list;
use parfetch_core::status::StatusLog;
use parfetch_core::verify::InitialVerifier;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    // 1. Options from the environment.
    let options = Options::from_env().context("loading parfetch configuration")?;
    info!(
        target = ?options.target,
        distdir = %options.distdir.display(),
        "parfetch starting"
    );

    let status = StatusLog::stdout();

    // 2. Unless makesum-ephemeral, create DISTDIR and chdir into it.
    if !options.makesum_ephemeral {
        tokio::fs::create_dir_all(&options.distdir)
            .await
            .with_context(|| format!("creating DISTDIR {}", options.distdir.display()))?;
        std::env::set_current_dir(&options.distdir)
            .with_context(|| format!("entering DISTDIR {}", options.distdir.display()))?;
    }

    // 3. Load the manifest.
    let manifest = load_manifest(&options).await?;
    let manifest = Arc::new(Mutex::new(manifest));

    // 4. Parse -d/-p flags into distfiles with their site groups.
    let mut distfiles = Vec::with_capacity(args.distfiles.len() + args.patchfiles.len());
    for spec in &args.distfiles {
        distfiles.push(build_distfile(SitesType::Master, spec, &options, &manifest).await?);
    }
    for spec in &args.patchfiles {
        distfiles.push(build_distfile(SitesType::Patch, spec, &options, &manifest).await?);
    }

    // 6. Transfer driver: HTTP client + connection governor.
    let tls_policy = tls_policy_from_fetch_env(&options.fetch_env);
    let client = parfetch_core::download::MirrorClient::new(tls_policy)
        .context("building the mirror HTTP client")?;
    let governor = Arc::new(ConnectionGovernor::new(
        options.max_total_connections,
        options.max_host_connections,
    ));

    // 7. Seed the progress reporter with the sum of known manifest sizes
    // (skipped in makesum mode, where the total isn't known up front).
    let initial_total: u64 = if options.makesum {
        0
    } else {
        let guard = manifest.lock().await;
        distfiles
            .iter()
            .filter_map(|d| guard.entry(&d.full_name))
            .filter(|e| e.size_known())
            .map(|e| e.size as u64)
            .sum()
    };
    let progress = Arc::new(ProgressReporter::new(initial_total, args.quiet));
    let _interrupt_watcher = progress.spawn_interrupt_watcher(status.clone());
    let _resize_watcher = progress.spawn_resize_watcher();

    let options = Arc::new(options);

    // 8. Parallel initial verification.
    let verifier = InitialVerifier::new(options.clone());
    let verify_report = verifier.verify(&distfiles, manifest.clone(), &status).await;
    let satisfied: HashSet<String> = verify_report
        .satisfied_names()
        .map(str::to_string)
        .collect();
    for distfile in &mut distfiles {
        if satisfied.contains(&distfile.full_name) {
            distfile.fetched = true;
        }
    }

    // 9/10. Issue the first attempt for every still-unfetched distfile and
    // run the fetch engine until every one of them has either fetched or
    // exhausted its mirror queue.
    let (already_fetched, needs_fetch): (Vec<_>, Vec<_>) =
        distfiles.into_iter().partition(|d| d.fetched);

    let engine = FetchEngine::new(client, governor, status.clone());
    let fetch_report = if needs_fetch.is_empty() {
        FetchReport {
            all_fetched: true,
            results: Vec::new(),
            fatal: None,
        }
    } else {
        engine
            .run(needs_fetch, manifest.clone(), options.clone(), progress.clone())
            .await
    };

    // 11. Teardown.
    progress.finish();

    // An unsupported mirror URL scheme aborts the whole run; nothing past
    // this point (including a makesum write-out) should happen.
    if let Some(fatal) = &fetch_report.fatal {
        bail!("{fatal}");
    }

    let all_fetched =
        already_fetched.iter().all(|d| d.fetched) && fetch_report.all_fetched;

    // 12. On success in makesum mode, serialize the manifest.
    if all_fetched && options.makesum {
        write_manifest(&options, &manifest, &status).await?;
    }

    if all_fetched {
        Ok(())
    } else {
        bail!("could not fetch all distfiles");
    }
}

/// Loads the distinfo manifest: read and parse it if present; otherwise
/// synthesize an empty one in makesum mode, or when neither checksum nor
/// size are being enforced (so nothing will ever consult it); any other
/// missing-file case is fatal.
async fn load_manifest(options: &Options) -> Result<Manifest> {
    match tokio::fs::read_to_string(&options.distinfo_file).await {
        Ok(text) => {
            let mut manifest = Manifest::parse(&text).with_context(|| {
                format!(
                    "parsing distinfo file {}",
                    options.distinfo_file.display()
                )
            })?;
            manifest.ensure_timestamp();
            Ok(manifest)
        }
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            if options.makesum {
                let mut manifest = Manifest::new();
                manifest.ensure_timestamp();
                Ok(manifest)
            } else if options.no_checksum && options.disable_size {
                Ok(Manifest::new())
            } else {
                bail!(
                    "could not read distinfo file {}: {source}",
                    options.distinfo_file.display()
                )
            }
        }
        Err(source) => Err(ManifestError::Io {
            path: options.distinfo_file.clone(),
            source,
        }
        .into()),
    }
}

/// Builds one distfile from a `-d`/`-p` argument: resolves its full
/// (possibly `DIST_SUBDIR`-prefixed) name, validates/creates its manifest
/// entry, and fills its mirror queue from the sites group map.
async fn build_distfile(
    sites_type: SitesType,
    spec: &str,
    options: &Options,
    manifest: &Mutex<Manifest>,
) -> Result<Distfile> {
    let (name, groups) = parse_distfile_spec(spec);
    let full_name = match &options.dist_subdir {
        Some(subdir) => format!("{subdir}/{name}"),
        None => name.clone(),
    };

    {
        let mut guard = manifest.lock().await;
        if !guard.contains(&full_name) {
            if options.makesum {
                guard.add_entry(full_name.clone(), None);
            } else if !(options.no_checksum && options.disable_size) {
                bail!("missing distinfo entry for {full_name}");
            }
        }
    }

    let mut distfile = Distfile::new(sites_type, name, full_name, groups.clone());
    let sites = build_site_list(sites_type, &groups, options)
        .with_context(|| format!("building mirror site list for {}", distfile.full_name))?;
    for site in &sites {
        distfile.push_site(site);
    }
    Ok(distfile)
}

/// Serializes the manifest to `DISTINFO_FILE` with mode 0644.
async fn write_manifest(
    options: &Options,
    manifest: &Mutex<Manifest>,
    status: &StatusLog,
) -> Result<()> {
    let text = {
        let guard = manifest.lock().await;
        guard.to_string_repr()
    };
    tokio::fs::write(&options.distinfo_file, text)
        .await
        .with_context(|| {
            format!(
                "writing distinfo file {}",
                options.distinfo_file.display()
            )
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(
            &options.distinfo_file,
            std::fs::Permissions::from_mode(0o644),
        )
        .await
        .with_context(|| {
            format!(
                "setting permissions on distinfo file {}",
                options.distinfo_file.display()
            )
        })?;
    }

    status.wrote(&options.distinfo_file.display().to_string());
    Ok(())
}
