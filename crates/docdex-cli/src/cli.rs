//! Argument parsing and environment-to-config mapping.

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use docdex_core::types::{ScrapeMode, ScrapeScope};
use docdex_core::Config;
use std::path::PathBuf;

/// docdex - documentation indexing and hybrid search.
#[derive(Debug, Parser)]
#[command(name = "docdex", version, about)]
pub struct Cli {
    /// Data directory override.
    #[arg(long, global = true, env = "DOCDEX_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Config file path (defaults to <data-dir>/config.toml when present).
    #[arg(long, global = true, env = "DOCDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Delegate job commands to a remote docdex server.
    #[arg(long, global = true, env = "DOCDEX_SERVER")]
    pub server: Option<String>,

    /// Verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index documentation from a URL into a library version.
    Index(IndexArgs),
    /// Re-check an indexed version against its source.
    Refresh(RefreshArgs),
    /// Search an indexed library.
    Search(SearchArgs),
    /// List indexed libraries and versions.
    List,
    /// Remove an indexed version.
    Remove(RemoveArgs),
    /// Show jobs.
    Jobs(JobsArgs),
    /// Cancel a job.
    Cancel(CancelArgs),
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Root URL (http(s):// or file://).
    pub url: String,
    /// Library name.
    pub library: String,
    /// Version to index under; omitted indexes the unversioned entry.
    #[arg(long)]
    pub version: Option<String>,
    /// Page budget for the crawl.
    #[arg(long, default_value_t = 1000)]
    pub max_pages: u32,
    /// Link depth budget.
    #[arg(long, default_value_t = 3)]
    pub max_depth: u32,
    /// Parallel fetches.
    #[arg(long, default_value_t = 3)]
    pub max_concurrency: u32,
    /// Crawl scope.
    #[arg(long, value_enum, default_value_t = ScopeArg::Subpages)]
    pub scope: ScopeArg,
    /// Fetch engine.
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    pub scrape_mode: ModeArg,
    /// Surface redirects instead of following them.
    #[arg(long)]
    pub no_follow_redirects: bool,
    /// Only index URLs matching these patterns (`/re/` = regex, else glob).
    #[arg(long = "include")]
    pub include_patterns: Vec<String>,
    /// Never index URLs matching these patterns.
    #[arg(long = "exclude")]
    pub exclude_patterns: Vec<String>,
    /// Abort on the first page error instead of continuing.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Library name.
    pub library: String,
    /// Version to refresh; omitted refreshes the unversioned entry.
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Library name.
    pub library: String,
    /// Query text.
    pub query: String,
    /// Version or semver range (e.g. `1.x`); omitted uses the latest.
    #[arg(long)]
    pub version: Option<String>,
    /// Result count.
    #[arg(long, default_value_t = 5)]
    pub limit: usize,
    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Library name.
    pub library: String,
    /// Version to remove; omitted removes the unversioned entry.
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(Debug, Args)]
pub struct JobsArgs {
    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CancelArgs {
    /// Job id.
    pub id: String,
}

/// Crawl scope as a CLI value.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ScopeArg {
    /// Stay under the root URL's path.
    Subpages,
    /// Stay on the root host.
    Hostname,
    /// Stay on the registrable domain.
    Domain,
}

impl From<ScopeArg> for ScrapeScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Subpages => Self::Subpages,
            ScopeArg::Hostname => Self::Hostname,
            ScopeArg::Domain => Self::Domain,
        }
    }
}

/// Fetch engine as a CLI value.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ModeArg {
    /// Plain HTTP fetching.
    Fetch,
    /// Browser-based fetching.
    Playwright,
    /// Choose automatically.
    Auto,
}

impl From<ModeArg> for ScrapeMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Fetch => Self::Fetch,
            ModeArg::Playwright => Self::Playwright,
            ModeArg::Auto => Self::Auto,
        }
    }
}

impl Cli {
    /// Assembles the core config: file config (when present), then
    /// environment, then command-line overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(data_dir) = &self.data_dir {
            config.data_dir = Some(data_dir.clone());
        }

        // Embedding settings come from the environment; the core itself
        // never reads env vars.
        if let Ok(provider) = std::env::var("DOCDEX_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("DOCDEX_EMBEDDING_MODEL") {
            config.embedding.model = Some(model);
        }
        if let Ok(base_url) = std::env::var("DOCDEX_EMBEDDING_BASE_URL") {
            config.embedding.base_url = Some(base_url);
        }
        if let Ok(api_key) = std::env::var("DOCDEX_EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(api_key);
        }
        if let Ok(dimension) = std::env::var("DOCDEX_EMBEDDING_DIMENSION") {
            config.embedding.dimension = Some(
                dimension
                    .parse()
                    .context("DOCDEX_EMBEDDING_DIMENSION must be an integer")?,
            );
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_index_command() {
        let cli = Cli::try_parse_from([
            "docdex",
            "index",
            "https://docs.example.com/",
            "example",
            "--version",
            "1.0.0",
            "--max-pages",
            "50",
            "--exclude",
            "**/changelog/**",
        ])
        .unwrap();
        match cli.command {
            Command::Index(args) => {
                assert_eq!(args.library, "example");
                assert_eq!(args.version.as_deref(), Some("1.0.0"));
                assert_eq!(args.max_pages, 50);
                assert_eq!(args.exclude_patterns, vec!["**/changelog/**"]);
            },
            _ => panic!("expected index command"),
        }
    }

    #[test]
    fn test_cli_parses_search_with_limit() {
        let cli = Cli::try_parse_from([
            "docdex", "search", "example", "how to retry", "--limit", "3", "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "how to retry");
                assert_eq!(args.limit, 3);
                assert!(args.json);
            },
            _ => panic!("expected search command"),
        }
    }
}
