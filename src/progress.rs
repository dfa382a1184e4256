//! A 1 Hz byte-progress widget, generalized from a spinner to a bar.
//!
//! The widget itself only tracks bytes transferred against an expected
//! total; in makesum mode the total isn't known up front and changes as
//! files are discovered, so [`ProgressReporter::adjust_total`] exists
//! alongside [`ProgressReporter::add`]. [`ProgressReporter::retreat`]
//! reverses a delta when a mirror attempt is abandoned mid-transfer, so the
//! bar never overshoots 100% on a size/checksum mismatch.
//! [`ProgressReporter::set_current_file`] drives the "current file" field
//! of the rendered line. On a narrow terminal the bar itself is dropped in
//! favor of a bare `NNN%` line, since there isn't room for both the bar and
//! the filename.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::status::StatusLog;

/// Width, in columns, of the rendered bar itself (the `====>   ` part).
const PROGRESS_BAR_WIDTH: usize = 40;

/// Below this terminal width there's no room for `[100%] [<bar>] `
/// alongside a filename, so the bar degrades to a bare percentage.
const NARROW_WIDTH_THRESHOLD: usize = PROGRESS_BAR_WIDTH + "[100%] [] ".len();

#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    interrupted: Arc<AtomicBool>,
}

impl ProgressReporter {
    /// `quiet` forces a hidden bar (no tty probing); otherwise the bar is
    /// only rendered when stdout is a terminal.
    pub fn new(total_bytes: u64, quiet: bool) -> Self {
        let bar = if quiet || !std::io::stdout().is_terminal() {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total_bytes);
            bar.set_style(Self::style_for_width(terminal_width()));
            bar.enable_steady_tick(Duration::from_secs(1));
            bar
        };
        Self {
            bar,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    fn style_for_width(width: usize) -> ProgressStyle {
        if width < NARROW_WIDTH_THRESHOLD {
            ProgressStyle::with_template("{percent:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
        } else {
            ProgressStyle::with_template(&format!(
                "{{percent:>3}}% [{{bar:{PROGRESS_BAR_WIDTH}.cyan/blue}}] {{msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
        }
    }

    pub fn add(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    /// Reverses a delta previously applied with [`Self::add`] when an
    /// attempt is abandoned partway through.
    pub fn retreat(&self, bytes: u64) {
        self.bar.set_position(self.bar.position().saturating_sub(bytes));
    }

    /// Adjusts the expected total by a signed delta: `-previous + new`.
    /// Covers both a distfile whose size wasn't known up front (previous
    /// contribution 0, delta is the whole observed size) and a makesum
    /// rerun where the observed size differs from what was already in the
    /// manifest (previous contribution is the old recorded size). A no-op
    /// delta of 0 leaves the total untouched.
    pub fn adjust_total(&self, delta: i64) {
        if delta == 0 {
            return;
        }
        let current = self.bar.length().unwrap_or(0) as i64;
        self.bar.set_length((current + delta).max(0) as u64);
    }

    /// Sets the filename shown alongside the bar, for "current file"
    /// display. Harmless to call on a hidden bar.
    pub fn set_current_file(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    /// The bar's current expected total, for tests that need to observe
    /// [`Self::adjust_total`]'s effect from outside this module.
    pub fn current_total(&self) -> Option<u64> {
        self.bar.length()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Spawns a background task that watches for SIGINT. On signal it
    /// clears the bar, reports "interrupted by user", and terminates the
    /// process immediately — matching the original tool's behavior of
    /// never writing a manifest update once interrupted.
    pub fn spawn_interrupt_watcher(&self, status: StatusLog) -> tokio::task::JoinHandle<()> {
        let interrupted = self.interrupted.clone();
        let bar = self.bar.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
                bar.finish_and_clear();
                status.line("interrupted by user");
                std::process::exit(1);
            }
        })
    }

    /// Spawns a background task that re-applies the width-appropriate
    /// style once a second when the terminal has been resized. Stands in
    /// for `SIGWINCH`: rather than catching the signal, the same 1 Hz tick
    /// that redraws the bar re-queries terminal width and swaps styles
    /// across the narrow/wide threshold when it changes. A no-op on a
    /// hidden bar.
    pub fn spawn_resize_watcher(&self) -> tokio::task::JoinHandle<()> {
        let bar = self.bar.clone();
        tokio::spawn(async move {
            if bar.is_hidden() {
                return;
            }
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            let mut last_width = terminal_width();
            loop {
                interval.tick().await;
                let width = terminal_width();
                if width != last_width {
                    bar.set_style(Self::style_for_width(width));
                    last_width = width;
                }
            }
        })
    }
}

fn terminal_width() -> usize {
    console::Term::stdout().size().1 as usize
}
