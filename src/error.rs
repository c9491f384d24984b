use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Repository identifier is not `owner/repo`.
    #[error("invalid user/repo format '{0}': expected format 'owner/repo'")]
    InvalidFormat(String),

    #[error("failed to create destination directory {path:?}: {source}")]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no release found for {0}")]
    NotFound(String),

    #[error("got 403 on api request: {0}")]
    Forbidden(String),

    /// Latest release exists but is not eligible for download.
    #[error("{0}")]
    SkippedRelease(&'static str),

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("bad status {status} from {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("expected 302 from {url}, got {status}")]
    UnexpectedStatus { status: StatusCode, url: String },

    #[error("redirect from {0} has no usable location header")]
    MissingLocation(String),

    #[error("asset '{0}' does not have a download URL")]
    MissingDownloadUrl(String),

    #[error("asset name '{0}' is not a plain file name")]
    InvalidAssetName(String),

    /// Two assets of one run map to the same local file.
    #[error("{0:?} is already taken by another asset in this run")]
    DuplicateTarget(PathBuf),

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("task for {repo} did not finish: {reason}")]
    TaskFailed { repo: String, reason: String },

    /// One or more repositories failed; `paths` still lists every asset that was obtained.
    #[error("errors occurred:\n{}", failures.join("\n"))]
    RepositoryFailures {
        paths: Vec<PathBuf>,
        failures: Vec<String>,
    },
}

impl Error {
    /// Paths obtained before the error, if the error carries any.
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Self::RepositoryFailures { paths, .. } => paths,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_failures_are_newline_joined() {
        let err = Error::RepositoryFailures {
            paths: vec![PathBuf::from("a")],
            failures: vec![
                "failed to download a/b: x".to_string(),
                "failed to download c/d: y".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "errors occurred:\nfailed to download a/b: x\nfailed to download c/d: y"
        );
        assert_eq!(err.paths(), [PathBuf::from("a")]);
    }

    #[test]
    fn other_errors_carry_no_paths() {
        assert!(Error::InvalidFormat("x".into()).paths().is_empty());
    }
}
