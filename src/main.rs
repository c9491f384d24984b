use std::{num::NonZeroUsize, path::PathBuf, process::exit, time::Instant};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use humantime::format_duration;
use log::{error, info, warn};
use relfetch::{
    get_error_chain, DownloadStrategy, Downloader, DownloaderConfig, FileNaming, GithubClient,
    Layout, API_URL_ENV_VAR, DEFAULT_API_URL, DEFAULT_DEST, TOKEN_ENV_VAR,
};
use tokio::runtime;

/// Download the latest release binaries of GitHub repositories.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// GitHub token, requests are unauthenticated without one (rate limits apply)
    #[arg(long, short = 't', env = TOKEN_ENV_VAR, hide_env_values = true)]
    token: Option<String>,

    /// Destination directory for downloaded binaries
    #[arg(long, short = 'd', default_value = DEFAULT_DEST)]
    dest: PathBuf,

    /// Comma-separated list of repositories in 'owner/repo' format
    #[arg(long, value_delimiter = ',')]
    repos: Vec<String>,

    /// Repository in 'owner/repo' format, can be given multiple times
    #[arg(long = "repo", short = 'r')]
    repo: Vec<String>,

    /// Only download assets whose name contains this substring
    #[arg(long = "match", short = 'm')]
    match_filter: Option<String>,

    /// How asset download urls are resolved
    #[arg(long, value_enum, default_value_t)]
    strategy: DownloadStrategy,

    /// Directory layout under the destination
    #[arg(long, value_enum, default_value_t)]
    layout: Layout,

    /// File naming of downloaded assets
    #[arg(long, value_enum, default_value_t)]
    naming: FileNaming,

    /// Max repositories downloaded at once, unlimited if not given
    #[arg(long)]
    concurrency: Option<NonZeroUsize>,

    /// Base url of the GitHub api
    #[arg(long, env = API_URL_ENV_VAR, default_value = DEFAULT_API_URL)]
    api_url: String,
}

impl Args {
    fn all_repos(&self) -> Vec<String> {
        self.repos
            .iter()
            .chain(&self.repo)
            .map(|repo| repo.trim().to_string())
            .filter(|repo| !repo.is_empty())
            .collect()
    }
}

async fn inner_main(args: Args, repos: Vec<String>) -> anyhow::Result<()> {
    let client = if args.api_url == DEFAULT_API_URL {
        GithubClient::new(args.token)
    } else {
        GithubClient::with_api_base(args.token, args.api_url)
    }
    .context("could not build http client")?;
    if !client.has_token() {
        warn!("no GitHub token provided, proceeding with unauthenticated requests (rate limits apply).");
    }

    let config = DownloaderConfig {
        dest: args.dest,
        match_filter: args.match_filter,
        strategy: args.strategy,
        layout: args.layout,
        naming: args.naming,
        concurrency: args.concurrency,
    };
    let downloader = Downloader::new(client, config);

    info!(
        "starting download of {} repositories into {:?}",
        repos.len(),
        downloader.config().dest
    );
    let start = Instant::now();
    let paths = match downloader.download_latest_releases(&repos).await {
        Ok(paths) => paths,
        Err(err) => {
            for path in err.paths() {
                info!("obtained {}", path.display());
            }
            return Err(anyhow::Error::new(err).context("error downloading releases"));
        }
    };

    println!(
        "download completed successfully, took {}.",
        format_duration(start.elapsed())
    );
    println!("Downloaded binaries:");
    for path in paths {
        println!("{}", path.display());
    }

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let repos = args.all_repos();
    if repos.is_empty() {
        eprintln!("error: at least one repository is required.\n");
        eprintln!("{}", Args::command().render_usage());
        exit(1);
    }

    let rt = match runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start tokio runtime: {err}");
            exit(1);
        }
    };

    if let Err(err) = rt.block_on(inner_main(args, repos)) {
        error!("{}", get_error_chain(&err));
        exit(1);
    }
}
