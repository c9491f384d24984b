//! Fetches the latest release binaries of one or more GitHub repositories.

mod config;
mod download;
mod error;
mod fetch;
mod filter;
mod github;
mod repo;

pub use config::{DownloadStrategy, DownloaderConfig, FileNaming, Layout};
pub use download::{check_release, release_target, resolve_release, Downloader, ReleaseTarget};
pub use error::{Error, Result};
pub use fetch::file_name_for;
pub use filter::matches;
pub use github::{GithubClient, Release, ReleaseAsset};
pub use repo::RepoRef;

pub const DEFAULT_DEST: &str = "./downloads";
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";
pub const API_URL_ENV_VAR: &str = "GITHUB_API_URL";

pub fn get_error_chain(err: &anyhow::Error) -> String {
    err.chain()
        .rev()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" => ")
}
