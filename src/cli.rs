//! CLI argument definitions using clap derive macros.
//!
//! Nearly all configuration comes from the `dp_*` environment namespace
//! (see [`crate::config`]) rather than flags — these are the two
//! exceptions, plus the standard verbosity toggles.

use clap::Parser;

/// Verify and concurrently fetch mirrored distribution files against a
/// distinfo manifest.
#[derive(Parser, Debug)]
#[command(name = "parfetch")]
#[command(author, version, about)]
pub struct Args {
    /// A distfile to operate on, as `name` or `name:group1,group2`
    /// (default group `DEFAULT`). Repeatable.
    #[arg(short = 'd', long = "distfile")]
    pub distfiles: Vec<String>,

    /// A patch distfile to operate on, same syntax as `-d`. Repeatable.
    #[arg(short = 'p', long = "patchfile")]
    pub patchfiles: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress and status output
    #[arg(short, long)]
    pub quiet: bool,
}
