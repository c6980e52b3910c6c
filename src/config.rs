use crate::cli::Cli;
use anyhow::{Context, bail};
use log::{info, warn};
use serde::Deserialize;
use std::{collections::BTreeSet, path::Path, time::Duration};

const DEFAULT_DAYS: u32 = 90;
const SECONDS_PER_HOUR: u64 = 60 * 60;
/// a century; larger look-back windows fall outside the representable dates
pub const MAX_DAYS: u32 = 36_500;
/// ten years
pub const MAX_INTERVAL_HOURS: u64 = 24 * 365 * 10;

/// Everything a single cleanup cycle needs. Built once at startup from CLI
/// flags, environment variables and an optional config file, then only ever
/// borrowed.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub emby: ServerConfig,
    pub sonarr: Option<ServerConfig>,
    pub radarr: Option<ServerConfig>,
    pub days: u32,
    pub whitelist: Whitelist,
    pub libraries: LibraryFilter,
    pub delete_mode: DeleteMode,
    pub delete_files: bool,
    pub dry_run: bool,
    pub include_recent: bool,
    pub ignore_episodes: bool,
    pub ignore_recent_episodes: bool,
    pub sort_by_size: bool,
    pub schedule: Option<Schedule>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// only report, never delete anything
    #[default]
    None,
    /// ask for confirmation before deleting each item
    Interactive,
    /// delete every candidate
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub run_at_start: bool,
}

/// User names whose playback is looked at separately from everybody else's.
/// Matching is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist(BTreeSet<String>);

impl Whitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        Self(names)
    }

    pub fn contains(&self, user_name: &str) -> bool {
        self.0.contains(&user_name.to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LibraryFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl LibraryFilter {
    fn from_names(names: Vec<String>) -> Self {
        let names: BTreeSet<String> = names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            Self::All
        } else {
            Self::Only(names)
        }
    }

    pub fn matches(&self, library_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(library_name),
        }
    }
}

/// Optional TOML config file. Every value in it is overridden by the
/// matching environment variable or CLI flag.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct FileConfig {
    pub emby: Option<ServerConfig>,
    pub sonarr: Option<ServerConfig>,
    pub radarr: Option<ServerConfig>,
    pub days: Option<u32>,
    pub whitelist: Vec<String>,
    pub libraries: Vec<String>,
    pub delete_mode: Option<DeleteMode>,
    pub delete_files: Option<bool>,
    pub dry_run: Option<bool>,
    pub include_recent: Option<bool>,
    pub ignore_episodes: Option<bool>,
    pub ignore_recent_episodes: Option<bool>,
    pub sort_by_size: Option<bool>,
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    pub run_at_start: Option<bool>,
}

impl FileConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let config = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config: FileConfig = toml::from_str(&config)
            .with_context(|| format!("unable to parse config file {}", path.display()))?;
        Ok(config)
    }
}

impl RunConfig {
    /// Merge CLI arguments (which already include environment variables)
    /// with the config file. Every value, toggles included, comes from the
    /// first source that sets it.
    pub fn resolve(cli: &Cli, file: FileConfig) -> anyhow::Result<Self> {
        let file_emby = file.emby.unwrap_or_default();
        let base_url = cli
            .server
            .clone()
            .or(non_empty(file_emby.base_url))
            .context("media server url is required (--server or EMBY_SERVER)")?;
        let api_key = cli
            .api_key
            .clone()
            .or(non_empty(file_emby.api_key))
            .context("media server api key is required (--api-key or EMBY_API_KEY)")?;

        let sonarr = manager_config(
            "Sonarr",
            cli.sonarr_url.clone(),
            cli.sonarr_api_key.clone(),
            file.sonarr,
        );
        let radarr = manager_config(
            "Radarr",
            cli.radarr_url.clone(),
            cli.radarr_api_key.clone(),
            file.radarr,
        );

        let whitelist = if cli.whitelist.is_empty() {
            Whitelist::new(&file.whitelist)
        } else {
            Whitelist::new(&cli.whitelist)
        };
        let libraries = if cli.libraries.is_empty() {
            LibraryFilter::from_names(file.libraries)
        } else {
            LibraryFilter::from_names(cli.libraries.clone())
        };

        let interval = match cli.interval {
            Some(hours) => {
                let secs = hours
                    .checked_mul(SECONDS_PER_HOUR)
                    .with_context(|| format!("interval of {hours} hours is too large"))?;
                Some(Duration::from_secs(secs))
            }
            None => file.interval,
        };
        let schedule = match interval {
            Some(interval) if interval.is_zero() => bail!("interval must be greater than 0"),
            Some(interval) if interval.as_secs() > MAX_INTERVAL_HOURS * SECONDS_PER_HOUR => {
                bail!("interval must be at most {MAX_INTERVAL_HOURS} hours")
            }
            Some(interval) => Some(Schedule {
                interval,
                run_at_start: toggle(cli.run_at_start, file.run_at_start),
            }),
            None => None,
        };

        let days = cli.days.or(file.days).unwrap_or(DEFAULT_DAYS);
        if days > MAX_DAYS {
            bail!("days must be at most {MAX_DAYS}, got {days}");
        }

        let mut delete_mode = cli.delete_mode.or(file.delete_mode).unwrap_or_default();
        if schedule.is_some() && delete_mode == DeleteMode::Interactive {
            warn!(
                "interactive deletion is not compatible with scheduled execution, falling back to delete mode \"none\""
            );
            delete_mode = DeleteMode::None;
        }

        Ok(Self {
            emby: ServerConfig { base_url, api_key },
            sonarr,
            radarr,
            days,
            whitelist,
            libraries,
            delete_mode,
            delete_files: toggle(cli.delete_files, file.delete_files),
            dry_run: toggle(cli.dry_run, file.dry_run),
            include_recent: toggle(cli.include_recent, file.include_recent),
            ignore_episodes: toggle(cli.ignore_episodes, file.ignore_episodes),
            ignore_recent_episodes: toggle(cli.ignore_recent_episodes, file.ignore_recent_episodes),
            sort_by_size: toggle(cli.sort_by_size, file.sort_by_size),
            schedule,
        })
    }

    pub fn log_summary(&self) {
        info!("media server: {}", self.emby.base_url);
        info!("looking for items not watched in the last {} days", self.days);
        if self.whitelist.is_empty() {
            info!("whitelisted users: none");
        } else {
            let names: Vec<&str> = self.whitelist.names().collect();
            info!("whitelisted users: {}", names.join(", "));
        }
        if let LibraryFilter::Only(names) = &self.libraries {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            info!("only checking libraries: {}", names.join(", "));
        }
        info!(
            "delete mode: {:?}{}",
            self.delete_mode,
            if self.dry_run { " (dry run)" } else { "" }
        );
    }
}

/// flag or env var first, then the config file, off by default
fn toggle(cli: Option<bool>, file: Option<bool>) -> bool {
    cli.or(file).unwrap_or_default()
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

/// A library manager is only used when both its url and api key are known.
fn manager_config(
    name: &str,
    url: Option<String>,
    api_key: Option<String>,
    file: Option<ServerConfig>,
) -> Option<ServerConfig> {
    let file = file.unwrap_or_default();
    let url = url.or(non_empty(file.base_url));
    let api_key = api_key.or(non_empty(file.api_key));
    match (url, api_key) {
        (Some(base_url), Some(api_key)) => Some(ServerConfig { base_url, api_key }),
        (None, None) => None,
        _ => {
            warn!("{name} needs both a url and an api key, ignoring its partial configuration");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["retainarr", "--server", "http://emby:8096", "--api-key", "k"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() -> anyhow::Result<()> {
        let config = RunConfig::resolve(&cli(&[]), FileConfig::default())?;
        assert_eq!(config.days, 90);
        assert_eq!(config.delete_mode, DeleteMode::None);
        assert_eq!(config.libraries, LibraryFilter::All);
        assert!(config.whitelist.is_empty());
        assert!(config.schedule.is_none());
        assert!(config.sonarr.is_none());
        assert!(!config.dry_run);
        Ok(())
    }

    #[test]
    fn test_missing_server_is_an_error() {
        let cli = Cli::try_parse_from(["retainarr", "--api-key", "k"]).unwrap();
        if cli.server.is_none() {
            assert!(RunConfig::resolve(&cli, FileConfig::default()).is_err());
        }
    }

    #[test]
    fn test_flags_take_precedence_over_file() -> anyhow::Result<()> {
        let file: FileConfig = toml::from_str(
            r#"
            days = 30
            whitelist = ["file-user"]
            delete_mode = "all"
            interval = "6h"

            [emby]
            base_url = "http://from-file:8096"
            api_key = "file-key"
            "#,
        )?;
        let cli = cli(&["--days", "120", "--whitelist", "Will,jane", "--interval", "12"]);
        let config = RunConfig::resolve(&cli, file)?;

        assert_eq!(config.emby.base_url, "http://emby:8096");
        assert_eq!(config.days, 120);
        assert!(config.whitelist.contains("will"));
        assert!(config.whitelist.contains("JANE"));
        assert!(!config.whitelist.contains("file-user"));
        assert_eq!(config.delete_mode, DeleteMode::All);
        let schedule = config.schedule.unwrap();
        assert_eq!(schedule.interval, Duration::from_secs(12 * 3600));
        assert!(!schedule.run_at_start);
        Ok(())
    }

    #[test]
    fn test_file_fills_in_missing_values() -> anyhow::Result<()> {
        let file: FileConfig = toml::from_str(
            r#"
            libraries = ["Movies", " "]
            interval = "90m"
            run_at_start = true
            sort_by_size = true

            [radarr]
            base_url = "http://radarr:7878"
            api_key = "radarr-key"
            "#,
        )?;
        let config = RunConfig::resolve(&cli(&[]), file)?;

        assert!(config.libraries.matches("Movies"));
        assert!(!config.libraries.matches("TV"));
        assert!(config.sort_by_size);
        assert_eq!(
            config.schedule,
            Some(Schedule {
                interval: Duration::from_secs(90 * 60),
                run_at_start: true,
            })
        );
        assert_eq!(config.radarr.unwrap().api_key, "radarr-key");
        Ok(())
    }

    #[test]
    fn test_interactive_downgraded_when_scheduled() -> anyhow::Result<()> {
        let config = RunConfig::resolve(
            &cli(&["--delete-mode", "interactive", "--interval", "24"]),
            FileConfig::default(),
        )?;
        assert_eq!(config.delete_mode, DeleteMode::None);

        let config = RunConfig::resolve(&cli(&["--delete-mode", "interactive"]), FileConfig::default())?;
        assert_eq!(config.delete_mode, DeleteMode::Interactive);
        Ok(())
    }

    #[test]
    fn test_zero_interval_rejected() {
        let file: FileConfig = toml::from_str(r#"interval = "0s""#).unwrap();
        assert!(RunConfig::resolve(&cli(&[]), file).is_err());
        assert!(Cli::try_parse_from(["retainarr", "--interval", "0"]).is_err());
    }

    #[test]
    fn test_partial_manager_config_ignored() -> anyhow::Result<()> {
        let config = RunConfig::resolve(
            &cli(&["--sonarr-url", "http://sonarr:8989"]),
            FileConfig::default(),
        )?;
        assert!(config.sonarr.is_none());

        let config = RunConfig::resolve(
            &cli(&["--sonarr-url", "http://sonarr:8989", "--sonarr-api-key", "s"]),
            FileConfig::default(),
        )?;
        assert_eq!(
            config.sonarr,
            Some(ServerConfig {
                base_url: "http://sonarr:8989".to_string(),
                api_key: "s".to_string(),
            })
        );
        Ok(())
    }

    #[test]
    fn test_toggles_follow_precedence() -> anyhow::Result<()> {
        let file: FileConfig = toml::from_str(
            r#"
            delete_files = true
            dry_run = true
            sort_by_size = true
            "#,
        )?;
        // an explicit `false` (flag or env var) overrides the file
        let cli = cli(&["--delete-files=false", "--dry-run", "false", "--include-recent"]);
        let config = RunConfig::resolve(&cli, file)?;

        assert!(!config.delete_files);
        assert!(!config.dry_run);
        assert!(config.sort_by_size);
        assert!(config.include_recent);
        assert!(!config.ignore_episodes);
        Ok(())
    }

    #[test]
    fn test_days_bounded() -> anyhow::Result<()> {
        assert!(Cli::try_parse_from(["retainarr", "--days", "4000000000"]).is_err());

        let file: FileConfig = toml::from_str("days = 4000000000")?;
        assert!(RunConfig::resolve(&cli(&[]), file).is_err());

        let config = RunConfig::resolve(&cli(&["--days", "36500"]), FileConfig::default())?;
        assert_eq!(config.days, MAX_DAYS);
        Ok(())
    }

    #[test]
    fn test_interval_bounded() -> anyhow::Result<()> {
        assert!(Cli::try_parse_from(["retainarr", "--interval", "18446744073709551615"]).is_err());

        let file: FileConfig = toml::from_str(r#"interval = "100000y""#)?;
        assert!(RunConfig::resolve(&cli(&[]), file).is_err());
        Ok(())
    }

    #[test]
    fn test_whitelist_ignores_blank_names() {
        let whitelist = Whitelist::new(["", "  Will ", "will"]);
        assert_eq!(whitelist.names().collect::<Vec<_>>(), vec!["will"]);
    }
}
