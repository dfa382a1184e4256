//! Status-line reporting shared by the fetch engine and the initial
//! verifier.
//!
//! Every line goes through a single mutex-guarded writer so that a
//! multi-line block (e.g. "error ...", "size mismatch ...", "next mirror")
//! from one concurrently-running distfile task is never interleaved with a
//! line from another.

use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct StatusLog {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl StatusLog {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let mut w = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(w, "{}", text.as_ref());
    }

    pub fn block(&self, lines: &[String]) {
        let mut w = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        for line in lines {
            let _ = writeln!(w, "{line}");
        }
    }

    pub fn queued(&self, url: &str) {
        self.line(format!("queued {url}"));
    }

    pub fn done(&self, name: &str) {
        self.line(format!("done {name}"));
    }

    pub fn error(&self, url: &str, detail: &str) {
        self.block(&[format!("error {url}"), detail.to_string()]);
    }

    pub fn size_mismatch(&self, name: &str, expected: i64, actual: u64) {
        self.line(format!(
            "size mismatch for {name} (expected: {expected}, actual: {actual})"
        ));
    }

    pub fn checksum_mismatch(&self, name: &str) {
        self.line(format!("checksum mismatch for {name}"));
    }

    pub fn unlink(&self, name: &str) {
        self.line(format!("unlink {name}"));
    }

    pub fn no_more_mirrors(&self, name: &str) {
        self.line(format!("No more mirrors left for {name}!"));
    }

    pub fn wrote(&self, path: &str) {
        self.line(format!("wrote {path}"));
    }

    pub fn failed(&self, msg: &str) {
        self.line(format!("failed: {msg}"));
    }

    pub fn verified(&self, summary: &str) {
        self.line(summary.to_string());
    }
}
