use reqwest::{redirect, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::{Error, RepoRef, Result, DEFAULT_API_URL};

/// A release's asset. Does not contain all fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    /// Api url of the asset, serves the binary when asked for `application/octet-stream`.
    pub url: String,
    pub browser_download_url: Option<String>,
}

/// A github release. Does not contain all fields.
///
/// See the github [docs](https://docs.github.com/en/rest/releases/releases?apiVersion=2022-11-28#get-the-latest-release) for more information
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

const USER_AGENT: &str = concat!("relfetch/", env!("CARGO_PKG_VERSION"));
const OCTET_STREAM: &str = "application/octet-stream";

/// Client for the releases api. Cheap to clone.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: Client,
    no_redirect: Client,
    token: Option<String>,
    api_base: String,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_URL)
    }

    /// Client talking to a different api host, e.g. GitHub Enterprise or a local mock.
    pub fn with_api_base(token: Option<String>, api_base: impl Into<String>) -> Result<Self> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        let no_redirect = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            no_redirect,
            token: token.filter(|t| !t.is_empty()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token)
        } else {
            request
        }
    }

    pub async fn get_latest_release(&self, repo: &RepoRef) -> Result<Release> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, repo.owner, repo.name
        );
        let request = self
            .client
            .request(Method::GET, &url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        let resp = self.authorize(request).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(Error::NotFound(repo.to_string())),
            StatusCode::FORBIDDEN => Err(Error::Forbidden(resp.text().await.map_or_else(
                |_| "no text could be parsed".to_string(),
                |t| t.trim().to_string(),
            ))),
            status => Err(Error::HttpStatus { status, url }),
        }
    }

    /// GET a binary. The response is returned whatever its status.
    ///
    /// `authenticated` attaches the token, `follow_redirects` picks the client
    /// that follows 3xx responses.
    pub async fn get_asset(
        &self,
        url: &str,
        authenticated: bool,
        follow_redirects: bool,
    ) -> Result<Response> {
        let client = if follow_redirects {
            &self.client
        } else {
            &self.no_redirect
        };
        let request = client.get(url).header("Accept", OCTET_STREAM);
        let request = if authenticated {
            self.authorize(request)
        } else {
            request
        };
        Ok(request.send().await?)
    }
}
