//! Snapshot of the media server's libraries together with every user's
//! playback state, re-fetched at the start of each cycle.

use crate::{
    config::{LibraryFilter, RunConfig, Whitelist},
    http::{EmbyClient, Item, ItemKind, ItemsFilter, User, UserData},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info, warn};
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
};

/// played percentage above which an item counts as watched even without a
/// "played" flag or timestamp
const WATCHED_PERCENTAGE: f64 = 75.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    pub library: String,
    pub kind: MediaKind,
    pub date_added: Option<DateTime<Utc>>,
    /// user name -> that user's playback of this item
    pub playback: BTreeMap<String, Playback>,
    pub provider_ids: ProviderIds,
    pub path: Option<String>,
    /// episodes the server only knows about from metadata (not on disk)
    pub is_virtual: bool,
    /// set when a date on the item could not be parsed
    pub metadata_issue: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaKind {
    Movie,
    Series,
    Episode(EpisodeRef),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EpisodeRef {
    pub series_id: String,
    pub series_title: String,
    pub series_tvdb_id: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderIds {
    pub tmdb: Option<String>,
    pub tvdb: Option<String>,
    pub imdb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Playback {
    pub last_played: Option<DateTime<Utc>>,
    pub played: bool,
    pub played_percentage: f64,
}

impl Playback {
    /// whether the user has watched this item at any point in time
    pub fn has_played(&self) -> bool {
        self.last_played.is_some() || self.played || self.played_percentage > WATCHED_PERCENTAGE
    }
}

impl MediaItem {
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            MediaKind::Movie => "movie",
            MediaKind::Series => "show",
            MediaKind::Episode(_) => "episode",
        }
    }

    pub fn series_id(&self) -> Option<&str> {
        match &self.kind {
            MediaKind::Episode(episode) => Some(&episode.series_id),
            _ => None,
        }
    }
}

impl Display for MediaItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            MediaKind::Episode(EpisodeRef {
                series_title,
                season: Some(season),
                episode: Some(episode),
                ..
            }) => write!(f, "{series_title} S{season:02}E{episode:02}"),
            MediaKind::Episode(EpisodeRef { series_title, .. }) => {
                write!(f, "{series_title} - {}", self.title)
            }
            _ => f.write_str(&self.title),
        }
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    pub items: Vec<MediaItem>,
}

impl Catalog {
    /// Fetch every library allowed by the config along with all users'
    /// playback state. Any media server error is returned as is: without the
    /// catalog there is nothing to evaluate.
    pub async fn fetch(emby: &EmbyClient, config: &RunConfig) -> anyhow::Result<Self> {
        let users = emby.users().await?;
        info!("found {} users", users.len());
        warn_unknown_whitelisted(config, &users);

        let libraries = emby.libraries().await?;
        let libraries = select_libraries(libraries, &config.libraries);

        let mut items = Vec::new();
        for (library_name, library_id) in libraries {
            info!("processing library \"{library_name}\"");
            let filter = ItemsFilter::library_contents(&library_id);
            let library_items = emby.items(&filter).await?;

            let mut user_views = Vec::with_capacity(users.len());
            for user in &users {
                debug!("fetching playback state of \"{}\" in \"{library_name}\"", user.name);
                let user_items = emby.user_items(&user.id, &filter).await?;
                user_views.push((user.name.clone(), user_items));
            }

            let assembled = assemble(&library_name, library_items, &user_views);
            info!("found {} items in library \"{library_name}\"", assembled.len());
            items.extend(assembled);
        }

        Ok(Self { items })
    }
}

fn warn_unknown_whitelisted(config: &RunConfig, users: &[User]) {
    for name in unknown_whitelisted(&config.whitelist, users) {
        warn!("whitelisted user \"{name}\" not found on the server");
    }
}

/// Whitelisted names without a matching server user, compared the same way
/// playback is matched against the whitelist.
fn unknown_whitelisted<'w>(whitelist: &'w Whitelist, users: &[User]) -> Vec<&'w str> {
    let known = Whitelist::new(users.iter().map(|u| &u.name));
    whitelist.names().filter(|name| !known.contains(name)).collect()
}

/// Pick the libraries to check as `(name, id)` pairs, in server order.
fn select_libraries(
    libraries: Vec<crate::http::VirtualFolder>,
    filter: &LibraryFilter,
) -> Vec<(String, String)> {
    let available: Vec<String> = libraries.iter().map(|l| l.name.clone()).collect();
    let selected: Vec<(String, String)> = libraries
        .into_iter()
        .filter(|library| {
            let included = filter.matches(&library.name);
            if !included {
                debug!("excluding library \"{}\"", library.name);
            }
            included
        })
        .filter_map(|library| match library.item_id {
            Some(id) => Some((library.name, id)),
            None => {
                warn!("library \"{}\" has no id, skipping", library.name);
                None
            }
        })
        .collect();

    if selected.is_empty() && matches!(filter, LibraryFilter::Only(_)) {
        warn!(
            "none of the specified libraries were found, available libraries: {}",
            available.join(", ")
        );
    }
    selected
}

/// Turn one library's raw items plus every user's view of them into
/// [`MediaItem`]s. Anything that is not a movie, series or episode is dropped.
pub fn assemble(
    library: &str,
    items: Vec<Item>,
    user_views: &[(String, Vec<Item>)],
) -> Vec<MediaItem> {
    let mut playback: HashMap<&str, BTreeMap<String, Playback>> = HashMap::new();
    let mut issues: HashMap<&str, String> = HashMap::new();

    for (user_name, user_items) in user_views {
        for item in user_items {
            let Some(user_data) = &item.user_data else {
                continue;
            };
            match parse_playback(user_data) {
                Ok(Some(p)) => {
                    playback
                        .entry(item.id.as_str())
                        .or_default()
                        .insert(user_name.clone(), p);
                }
                Ok(None) => {}
                Err(raw) => {
                    issues.insert(
                        item.id.as_str(),
                        format!("unparsable last played date \"{raw}\" for user {user_name}"),
                    );
                }
            }
        }
    }

    let series: HashMap<&str, (&str, Option<&str>)> = items
        .iter()
        .filter(|i| i.kind == ItemKind::Series)
        .map(|i| (i.id.as_str(), (i.name.as_str(), i.provider_id("tvdb"))))
        .collect();

    items
        .iter()
        .filter_map(|item| {
            let kind = match item.kind {
                ItemKind::Movie => MediaKind::Movie,
                ItemKind::Series => MediaKind::Series,
                ItemKind::Episode => MediaKind::Episode(episode_ref(item, &series)),
                ItemKind::Other => return None,
            };

            let mut metadata_issue = issues.get(item.id.as_str()).cloned();
            let date_added = match item.date_created.as_deref().map(|raw| (raw, parse_timestamp(raw))) {
                Some((_, Some(date))) => Some(date),
                Some((raw, None)) => {
                    metadata_issue.get_or_insert(format!("unparsable date added \"{raw}\""));
                    None
                }
                None => None,
            };
            if matches!(&kind, MediaKind::Episode(e) if e.series_id.is_empty()) {
                metadata_issue.get_or_insert("episode without a series".to_string());
            }

            Some(MediaItem {
                id: item.id.clone(),
                title: item.name.clone(),
                library: library.to_string(),
                kind,
                date_added,
                playback: playback.remove(item.id.as_str()).unwrap_or_default(),
                provider_ids: ProviderIds {
                    tmdb: item.provider_id("tmdb").map(ToOwned::to_owned),
                    tvdb: item.provider_id("tvdb").map(ToOwned::to_owned),
                    imdb: item.provider_id("imdb").map(ToOwned::to_owned),
                },
                path: item.path.clone(),
                is_virtual: item.is_virtual(),
                metadata_issue,
            })
        })
        .collect()
}

fn episode_ref(item: &Item, series: &HashMap<&str, (&str, Option<&str>)>) -> EpisodeRef {
    let series_id = item.series_id.clone().unwrap_or_default();
    let (series_title, series_tvdb_id) = match series.get(series_id.as_str()) {
        Some((title, tvdb)) => (title.to_string(), tvdb.map(ToOwned::to_owned)),
        None => (item.series_name.clone().unwrap_or_default(), None),
    };
    EpisodeRef {
        series_id,
        series_title,
        series_tvdb_id,
        season: item.parent_index_number,
        episode: item.index_number,
    }
}

/// `Ok(None)` when the user never touched the item, `Err(raw)` when the last
/// played date is present but unreadable.
fn parse_playback(user_data: &UserData) -> Result<Option<Playback>, String> {
    let last_played = match user_data.last_played_date.as_deref() {
        Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| raw.to_string())?),
        None => None,
    };
    let played_percentage = user_data.played_percentage.unwrap_or_default();
    if last_played.is_none() && !user_data.played && played_percentage <= 0.0 {
        return Ok(None);
    }
    Ok(Some(Playback {
        last_played,
        played: user_data.played,
        played_percentage,
    }))
}

/// Emby emits RFC 3339 with 7 fractional digits, but some versions drop the
/// offset; those are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
