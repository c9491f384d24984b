//! Fan-out over repositories: one task per repository, failures collected at the end.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, info, warn};
use tokio::{
    fs,
    sync::{mpsc, Semaphore},
};

use crate::{
    fetch::fetch_asset, filter::matches, DownloaderConfig, Error, GithubClient, Layout, Release,
    RepoRef, Result,
};

/// Where a release's assets go and whether existing files get replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    /// `<repo>-<tag>`, or `<repo>-latest` when the release has no tag.
    pub dir_name: String,
    /// Set for untagged releases, whose contents can change under the same name.
    pub force_overwrite: bool,
}

pub fn release_target(repo: &RepoRef, release: &Release) -> ReleaseTarget {
    match release.tag_name.as_deref().filter(|tag| !tag.is_empty()) {
        Some(tag) => ReleaseTarget {
            dir_name: format!("{}-{tag}", repo.name),
            force_overwrite: false,
        },
        None => ReleaseTarget {
            dir_name: format!("{}-latest", repo.name),
            force_overwrite: true,
        },
    }
}

/// Rejects releases that should not be downloaded from.
pub fn check_release(release: &Release) -> Result<()> {
    if release.draft || release.prerelease {
        return Err(Error::SkippedRelease("latest release is draft or pre-release"));
    }
    if release.assets.is_empty() {
        return Err(Error::SkippedRelease("no assets found in the latest release"));
    }
    Ok(())
}

/// Fetches the latest release of `repo` and decides where it goes.
pub async fn resolve_release(
    client: &GithubClient,
    repo: &RepoRef,
) -> Result<(Release, ReleaseTarget)> {
    let release = client.get_latest_release(repo).await?;
    check_release(&release)?;

    let target = release_target(repo, &release);
    Ok((release, target))
}

/// State shared by every task of one run.
pub(crate) struct Context {
    pub(crate) client: GithubClient,
    pub(crate) config: DownloaderConfig,
    paths: Mutex<Vec<PathBuf>>,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl Context {
    pub(crate) fn new(client: GithubClient, config: DownloaderConfig) -> Self {
        Self {
            client,
            config,
            paths: Mutex::new(Vec::new()),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Reserves `path` for one asset of this run. False if another asset already holds it.
    pub(crate) fn claim(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf())
    }

    pub(crate) fn record(&self, path: PathBuf) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(path);
    }

    pub(crate) fn take_paths(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.paths.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

pub struct Downloader {
    client: GithubClient,
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(client: GithubClient, config: DownloaderConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Downloads the latest release assets of every `owner/repo` in `repos`.
    ///
    /// A malformed identifier or an unusable destination aborts before anything
    /// is fetched. Otherwise every repository runs to completion, and failed ones
    /// are reported together in [`Error::RepositoryFailures`] along with the
    /// paths that were obtained.
    pub async fn download_latest_releases<S: AsRef<str>>(
        &self,
        repos: &[S],
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.config.dest)
            .await
            .map_err(|source| Error::DestinationUnavailable {
                path: self.config.dest.clone(),
                source,
            })?;

        let repos = repos
            .iter()
            .map(|repo| repo.as_ref().parse::<RepoRef>())
            .collect::<Result<Vec<_>>>()?;

        let ctx = Arc::new(Context::new(self.client.clone(), self.config.clone()));
        let limiter = self
            .config
            .concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.get())));

        // each task sends at most once, so sends never wait
        let (err_tx, mut err_rx) = mpsc::channel(repos.len().max(1));

        let mut handles = Vec::with_capacity(repos.len());
        for repo in repos {
            let ctx = Arc::clone(&ctx);
            let limiter = limiter.clone();
            let err_tx = err_tx.clone();
            let name = repo.to_string();

            let handle = tokio::spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };

                if let Err(err) = download_latest_release(&ctx, &repo).await {
                    let _ = err_tx.try_send(format!("failed to download {repo}: {err}"));
                }
            });
            handles.push((name, handle));
        }
        drop(err_tx);

        let mut panicked = Vec::new();
        for (repo, handle) in handles {
            if let Err(err) = handle.await {
                let err = Error::TaskFailed {
                    repo: repo.clone(),
                    reason: err.to_string(),
                };
                panicked.push(format!("failed to download {repo}: {err}"));
            }
        }

        let mut failures = Vec::new();
        while let Ok(failure) = err_rx.try_recv() {
            failures.push(failure);
        }
        failures.extend(panicked);

        let paths = ctx.take_paths();
        if failures.is_empty() {
            Ok(paths)
        } else {
            Err(Error::RepositoryFailures { paths, failures })
        }
    }
}

async fn download_latest_release(ctx: &Context, repo: &RepoRef) -> Result<()> {
    info!("fetching latest release of {repo}");
    let (release, target) = resolve_release(&ctx.client, repo).await?;

    let dir = match ctx.config.layout {
        Layout::Flat => ctx.config.dest.clone(),
        Layout::PerTag => ctx.config.dest.join(&target.dir_name),
    };
    debug!("{repo}: saving to {dir:?}, force overwrite: {}", target.force_overwrite);
    fs::create_dir_all(&dir)
        .await
        .map_err(|source| Error::Write {
            path: dir.clone(),
            source,
        })?;

    let filter = ctx.config.match_filter.as_deref();
    for asset in &release.assets {
        if !matches(&asset.name, filter) {
            info!(
                "skipping asset '{}' (does not match filter '{}')",
                asset.name,
                filter.unwrap_or_default()
            );
            continue;
        }

        if let Err(err) = fetch_asset(ctx, repo, asset, &dir, target.force_overwrite).await {
            warn!("failed to download asset '{}' from {repo}: {err}", asset.name);
        }
    }

    Ok(())
}
