use std::{num::NonZeroUsize, path::PathBuf};

use clap::ValueEnum;

use crate::DEFAULT_DEST;

/// How an asset's download URL is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DownloadStrategy {
    /// GET `browser_download_url` with the token attached.
    Direct,
    /// GET the asset api url, expect a 302 and follow its location unauthenticated.
    #[default]
    ApiRedirect,
}

/// Where asset files land under the destination root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Layout {
    Flat,
    /// `<repo>-<tag>/`, or `<repo>-latest/` for untagged releases.
    #[default]
    PerTag,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum FileNaming {
    #[default]
    Plain,
    /// `<owner>_<repo>_<asset>`
    Prefixed,
}

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub dest: PathBuf,
    pub match_filter: Option<String>,
    pub strategy: DownloadStrategy,
    pub layout: Layout,
    pub naming: FileNaming,
    /// Max repositories in flight. `None` spawns every repository at once.
    pub concurrency: Option<NonZeroUsize>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            dest: PathBuf::from(DEFAULT_DEST),
            match_filter: None,
            strategy: DownloadStrategy::default(),
            layout: Layout::default(),
            naming: FileNaming::default(),
            concurrency: None,
        }
    }
}
