//! Downloading a single release asset to disk.

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use log::{debug, info};
use reqwest::{header::LOCATION, Response, StatusCode};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};

use crate::{
    download::Context, DownloadStrategy, Error, FileNaming, GithubClient, ReleaseAsset, RepoRef,
    Result,
};

/// Local file name for an asset, rejecting names that would escape the target directory.
pub fn file_name_for(repo: &RepoRef, asset_name: &str, naming: FileNaming) -> Result<String> {
    if asset_name.is_empty()
        || asset_name == "."
        || asset_name == ".."
        || asset_name.contains(['/', '\\'])
    {
        return Err(Error::InvalidAssetName(asset_name.to_string()));
    }

    Ok(match naming {
        FileNaming::Plain => asset_name.to_string(),
        FileNaming::Prefixed => format!("{}_{}_{}", repo.owner, repo.name, asset_name),
    })
}

/// Fetches `asset` into `dir` and records the resulting path in the shared result set.
///
/// An existing file is kept, without issuing any request, unless `force_overwrite`
/// is set.
pub(crate) async fn fetch_asset(
    ctx: &Context,
    repo: &RepoRef,
    asset: &ReleaseAsset,
    dir: &Path,
    force_overwrite: bool,
) -> Result<PathBuf> {
    let file_name = file_name_for(repo, &asset.name, ctx.config.naming)?;
    let path = dir.join(&file_name);
    if !ctx.claim(&path) {
        return Err(Error::DuplicateTarget(path));
    }

    if !force_overwrite && matches!(fs::try_exists(&path).await, Ok(true)) {
        info!("file {path:?} already exists, skipping download.");
        ctx.record(path.clone());
        return Ok(path);
    }

    let resp = open_download(&ctx.client, asset, ctx.config.strategy).await?;
    let part = dir.join(format!("{file_name}.part"));
    if let Err(err) = stream_to_file(resp, &part).await {
        // best effort, a leftover part file is truncated on the next attempt
        let _ = fs::remove_file(&part).await;
        return Err(err);
    }
    fs::rename(&part, &path)
        .await
        .map_err(|source| Error::Write {
            path: path.clone(),
            source,
        })?;

    info!("downloaded '{}' from {repo} to {path:?}", asset.name);
    ctx.record(path.clone());
    Ok(path)
}

/// Issues the request(s) needed to get a 2xx response carrying the asset body.
async fn open_download(
    client: &GithubClient,
    asset: &ReleaseAsset,
    strategy: DownloadStrategy,
) -> Result<Response> {
    let resp = match strategy {
        DownloadStrategy::Direct => {
            let url = asset
                .browser_download_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .ok_or_else(|| Error::MissingDownloadUrl(asset.name.clone()))?;
            client.get_asset(url, true, true).await?
        }
        DownloadStrategy::ApiRedirect => {
            let resp = client.get_asset(&asset.url, true, false).await?;
            if resp.status() != StatusCode::FOUND {
                return Err(Error::UnexpectedStatus {
                    status: resp.status(),
                    url: asset.url.clone(),
                });
            }

            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| resp.url().join(location).ok())
                .ok_or_else(|| Error::MissingLocation(asset.url.clone()))?;
            debug!("'{}' redirects to {location}", asset.name);

            // pre-signed, the token must not leak to the storage host
            client.get_asset(location.as_str(), false, true).await?
        }
    };

    if !resp.status().is_success() {
        return Err(Error::HttpStatus {
            status: resp.status(),
            url: resp.url().to_string(),
        });
    }
    Ok(resp)
}

async fn stream_to_file(resp: Response, path: &Path) -> Result<()> {
    let write_err = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(path).await.map_err(write_err)?;
    let mut bytes_stream = resp.bytes_stream();
    while let Some(chunk) = bytes_stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(write_err)?;
    }
    file.flush().await.map_err(write_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DownloaderConfig;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn repo() -> RepoRef {
        "sharkdp/fd".parse().unwrap()
    }

    fn context(server: &MockServer, dir: &Path, strategy: DownloadStrategy) -> Context {
        let client =
            GithubClient::with_api_base(Some("secret".to_string()), server.base_url()).unwrap();
        let config = DownloaderConfig {
            dest: dir.to_path_buf(),
            strategy,
            ..Default::default()
        };
        Context::new(client, config)
    }

    fn asset(server: &MockServer, name: &str) -> ReleaseAsset {
        ReleaseAsset {
            name: name.to_string(),
            url: server.url(format!("/assets/{name}")),
            browser_download_url: Some(server.url(format!("/download/{name}"))),
        }
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[tokio::test]
    async fn direct_error_status_leaves_nothing_behind() {
        let server = MockServer::start_async().await;
        let tmp = TempDir::new().unwrap();
        let ctx = context(&server, tmp.path(), DownloadStrategy::Direct);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/download/fd.zip");
                then.status(500);
            })
            .await;

        let err = fetch_asset(&ctx, &repo(), &asset(&server, "fd.zip"), tmp.path(), false)
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::HttpStatus { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR)
        );
        assert!(entries(tmp.path()).is_empty());
        assert!(ctx.take_paths().is_empty());
    }

    #[tokio::test]
    async fn redirect_target_error_status_leaves_nothing_behind() {
        let server = MockServer::start_async().await;
        let tmp = TempDir::new().unwrap();
        let ctx = context(&server, tmp.path(), DownloadStrategy::ApiRedirect);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/assets/fd.zip");
                then.status(302).header("Location", server.url("/cdn/fd.zip"));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/cdn/fd.zip");
                then.status(403);
            })
            .await;

        let err = fetch_asset(&ctx, &repo(), &asset(&server, "fd.zip"), tmp.path(), false)
            .await
            .unwrap_err();

        assert!(
            matches!(err, Error::HttpStatus { status, .. } if status == StatusCode::FORBIDDEN)
        );
        assert!(entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn redirect_without_location() {
        let server = MockServer::start_async().await;
        let tmp = TempDir::new().unwrap();
        let ctx = context(&server, tmp.path(), DownloadStrategy::ApiRedirect);

        server
            .mock_async(|when, then| {
                when.method(GET).path("/assets/fd.zip");
                then.status(302);
            })
            .await;

        let err = fetch_asset(&ctx, &repo(), &asset(&server, "fd.zip"), tmp.path(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MissingLocation(url) if url.ends_with("/assets/fd.zip")));
        assert!(entries(tmp.path()).is_empty());
    }

    #[tokio::test]
    async fn relative_location_is_followed_without_token() {
        let server = MockServer::start_async().await;
        let tmp = TempDir::new().unwrap();
        let ctx = context(&server, tmp.path(), DownloadStrategy::ApiRedirect);

        let api = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/assets/fd.zip")
                    .header("Authorization", "Bearer secret");
                then.status(302).header("Location", "/cdn/fd.zip");
            })
            .await;
        let leaked = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/cdn/fd.zip")
                    .header_exists("Authorization");
                then.status(400);
            })
            .await;
        let cdn = server
            .mock_async(|when, then| {
                when.method(GET).path("/cdn/fd.zip");
                then.status(200).body("OK");
            })
            .await;

        let path = fetch_asset(&ctx, &repo(), &asset(&server, "fd.zip"), tmp.path(), false)
            .await
            .unwrap();

        assert_eq!(path, tmp.path().join("fd.zip"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "OK");
        assert_eq!(entries(tmp.path()), ["fd.zip"]);
        api.assert_hits_async(1).await;
        leaked.assert_hits_async(0).await;
        cdn.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn second_asset_with_same_target_is_rejected() {
        let server = MockServer::start_async().await;
        let tmp = TempDir::new().unwrap();
        let ctx = context(&server, tmp.path(), DownloadStrategy::Direct);

        let download = server
            .mock_async(|when, then| {
                when.method(GET).path("/download/fd.zip");
                then.status(200).body("first");
            })
            .await;

        let other: RepoRef = "someone/fd".parse().unwrap();
        let fd = asset(&server, "fd.zip");
        fetch_asset(&ctx, &repo(), &fd, tmp.path(), false)
            .await
            .unwrap();
        let err = fetch_asset(&ctx, &other, &fd, tmp.path(), true)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DuplicateTarget(ref p) if p == &tmp.path().join("fd.zip")));
        assert_eq!(ctx.take_paths(), [tmp.path().join("fd.zip")]);
        download.assert_hits_async(1).await;
    }

    #[test]
    fn plain_and_prefixed_names() {
        assert_eq!(
            file_name_for(&repo(), "fd.tar.gz", FileNaming::Plain).unwrap(),
            "fd.tar.gz"
        );
        assert_eq!(
            file_name_for(&repo(), "fd.tar.gz", FileNaming::Prefixed).unwrap(),
            "sharkdp_fd_fd.tar.gz"
        );
    }

    #[test]
    fn rejects_path_like_names() {
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(
                matches!(
                    file_name_for(&repo(), bad, FileNaming::Plain),
                    Err(Error::InvalidAssetName(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }
}
