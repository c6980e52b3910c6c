use crate::{
    config::{DeleteMode, MAX_DAYS, MAX_INTERVAL_HOURS},
    logging::LoggingSettings,
};
use clap::{Parser, builder::BoolishValueParser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "Retainarr",
    version,
    about = "Retainarr lists (and optionally deletes) media nobody has watched in a while from your Emby server and *arr stack."
)]
pub struct Cli {
    /// Emby server url, e.g. http://localhost:8096
    #[clap(short, long, env = "EMBY_SERVER")]
    pub server: Option<String>,
    /// Emby API key
    #[clap(short = 'k', long, env = "EMBY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Number of days to look back for unwatched media [default: 90]
    #[clap(short, long, env = "DAYS", value_parser = clap::value_parser!(u32).range(..=i64::from(MAX_DAYS)))]
    pub days: Option<u32>,
    /// Comma-separated list of users whose watch history is treated separately
    #[clap(short, long, env = "WHITELIST", value_delimiter = ',')]
    pub whitelist: Vec<String>,
    /// Comma-separated list of library names to check [default: all]
    #[clap(long, env = "LIBRARIES", value_delimiter = ',')]
    pub libraries: Vec<String>,
    /// What to do with unwatched media [default: none]
    #[clap(long, env = "DELETE_MODE", value_enum)]
    pub delete_mode: Option<DeleteMode>,
    /// Also delete files from disk when deleting from Sonarr/Radarr
    #[clap(long, env = "DELETE_FILES", value_parser = BoolishValueParser::new(), num_args = 0..=1, default_missing_value = "true")]
    pub delete_files: Option<bool>,
    /// Show what would be deleted without deleting anything
    #[clap(long, env = "DRY_RUN", value_parser = BoolishValueParser::new(), num_args = 0..=1, default_missing_value = "true")]
    pub dry_run: Option<bool>,
    /// Do not protect recently added items
    #[clap(long, env = "INCLUDE_RECENT", value_parser = BoolishValueParser::new(), num_args = 0..=1, default_missing_value = "true")]
    pub include_recent: Option<bool>,
    /// Only consider shows as a whole, never individual episodes
    #[clap(long, env = "IGNORE_EPISODES", value_parser = BoolishValueParser::new(), num_args = 0..=1, default_missing_value = "true")]
    pub ignore_episodes: Option<bool>,
    /// Do not protect shows that had episodes added recently
    #[clap(long, env = "IGNORE_RECENT_EPISODES", value_parser = BoolishValueParser::new(), num_args = 0..=1, default_missing_value = "true")]
    pub ignore_recent_episodes: Option<bool>,
    /// Sort unwatched media by size, largest first
    #[clap(long, env = "SORT_BY_SIZE", value_parser = BoolishValueParser::new(), num_args = 0..=1, default_missing_value = "true")]
    pub sort_by_size: Option<bool>,
    /// Sonarr url, e.g. http://localhost:8989
    #[clap(long, env = "SONARR_URL")]
    pub sonarr_url: Option<String>,
    /// Sonarr API key
    #[clap(long, env = "SONARR_API_KEY", hide_env_values = true)]
    pub sonarr_api_key: Option<String>,
    /// Radarr url, e.g. http://localhost:7878
    #[clap(long, env = "RADARR_URL")]
    pub radarr_url: Option<String>,
    /// Radarr API key
    #[clap(long, env = "RADARR_API_KEY", hide_env_values = true)]
    pub radarr_api_key: Option<String>,
    /// Re-run every N hours instead of running once
    #[clap(long, env = "INTERVAL", value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_HOURS))]
    pub interval: Option<u64>,
    /// When running on an interval, also run immediately at startup
    #[clap(long, env = "RUN_AT_START", value_parser = BoolishValueParser::new(), num_args = 0..=1, default_missing_value = "true")]
    pub run_at_start: Option<bool>,
    /// List all available libraries and exit
    #[clap(long)]
    pub list_libraries: bool,
    /// Set the log level, e.g. `debug` or `info,retainarr::http=debug`
    #[clap(short, long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: LoggingSettings,
    /// Path to an optional TOML config file
    #[clap(short, long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,
}
