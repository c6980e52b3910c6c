use log::{LevelFilter, warn};
use std::{fmt::Display, str::FromStr};

const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Installs the global logger: one line per record on stdout, a root level
/// and optional per-target levels. Directives that could not be parsed are
/// reported once the logger is up.
pub fn setup_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let mut cfg = fern::Dispatch::new()
        .level(settings.root_level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "{timestamp} [{level}] {message}",
                timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                level = record.level(),
                message = message,
            ))
        })
        .chain(std::io::stdout());

    for (log_target, level) in &settings.target_levels {
        cfg = cfg.level_for(log_target.clone(), *level);
    }
    cfg.apply()?;

    for directive in &settings.ignored {
        warn!("ignoring log level directive \"{directive}\", using {DEFAULT_LEVEL}");
    }
    Ok(())
}

/// Root log level followed by optional `target=level` overrides.
///
/// Examples:
///   - `info`
///   - `off,retainarr=debug,reqwest=info`
///   - `info,retainarr::http=debug,retainarr::retention=trace`
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub root_level: LevelFilter,
    pub target_levels: Vec<(String, LevelFilter)>,
    /// directives with an unknown level, replaced by the default level
    ignored: Vec<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            root_level: DEFAULT_LEVEL,
            target_levels: Vec::new(),
            ignored: Vec::new(),
        }
    }
}

impl FromStr for LoggingSettings {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut settings = Self::default();
        let mut directives = s.split(',').map(str::trim);

        if let Some(root) = directives.next().filter(|d| !d.is_empty()) {
            match LevelFilter::from_str(root) {
                Ok(level) => settings.root_level = level,
                Err(_) => settings.ignored.push(root.to_string()),
            }
        }

        for directive in directives {
            let Some((target, level)) = directive.split_once('=') else {
                if !directive.is_empty() {
                    settings.ignored.push(directive.to_string());
                }
                continue;
            };
            let level = LevelFilter::from_str(level.trim()).unwrap_or_else(|_| {
                settings.ignored.push(directive.to_string());
                DEFAULT_LEVEL
            });
            settings.target_levels.push((target.trim().to_string(), level));
        }

        Ok(settings)
    }
}

impl Display for LoggingSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root_level.as_str().to_lowercase())?;
        for (target, level) in &self.target_levels {
            write!(f, ",{target}={}", level.as_str().to_lowercase())?;
        }
        Ok(())
    }
}
