use thiserror::Error;

/// A single malformed line encountered while parsing a distinfo manifest.
#[derive(Debug, Clone)]
pub struct BadLine {
    pub line_number: usize,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    /// One or more `TIMESTAMP`/`SHA256`/`SIZE` lines were recognizable as
    /// such but malformed (bad number, bad hex, unbalanced parens). Every
    /// offending line is carried so the caller can print them all, matching
    /// the original tool's "report every bad line, then abort" behavior.
    #[error("{} malformed line(s) in distinfo manifest", .0.len())]
    Parse(Vec<BadLine>),

    #[error("failed to read distinfo manifest at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
