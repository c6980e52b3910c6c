//! Decides which catalog items nobody has watched within the retention
//! window.
//!
//! For every movie, series or episode the checks run in this order, and the
//! first one that applies wins:
//!
//! 1. broken metadata keeps the item
//! 2. any playback by a whitelisted user keeps the item
//! 3. a non-whitelisted user playing it after the cutoff keeps the item
//! 4. unless recently added items are included, being added after the
//!    cutoff keeps the item
//! 5. otherwise it is a delete candidate
//!
//! A series is only a candidate when the series itself and every episode on
//! disk are candidates.

use crate::{
    catalog::{MediaItem, MediaKind},
    config::{RunConfig, Whitelist},
    utils,
};
use chrono::{DateTime, Utc};
use log::debug;
use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    DeleteCandidate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    MissingMetadata(String),
    WatchedByWhitelisted { user: String },
    PlayedRecently { user: String, last_played: DateTime<Utc> },
    RecentlyAdded { added: DateTime<Utc> },
    ActiveEpisode { episode: String, cause: Box<Reason> },
    NeverPlayed,
    NotPlayedSince { last_played: DateTime<Utc> },
}

impl Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::MissingMetadata(what) => write!(f, "missing metadata: {what}"),
            Reason::WatchedByWhitelisted { user } => write!(f, "watched by whitelisted user {user}"),
            Reason::PlayedRecently { user, last_played } => {
                write!(f, "played by {user} on {}", last_played.format("%Y-%m-%d"))
            }
            Reason::RecentlyAdded { added } => write!(f, "added on {}", added.format("%Y-%m-%d")),
            Reason::ActiveEpisode { episode, cause } => write!(f, "{episode}: {cause}"),
            Reason::NeverPlayed => f.write_str("never played"),
            Reason::NotPlayedSince { last_played } => {
                write!(f, "last played on {}", last_played.format("%Y-%m-%d"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetentionDecision {
    pub item: MediaItem,
    pub verdict: Verdict,
    pub reason: Reason,
}

impl RetentionDecision {
    pub fn is_candidate(&self) -> bool {
        self.verdict == Verdict::DeleteCandidate
    }
}

pub struct RetentionPolicy<'a> {
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
    whitelist: &'a Whitelist,
    include_recent: bool,
    ignore_episodes: bool,
    ignore_recent_episodes: bool,
}

impl<'a> RetentionPolicy<'a> {
    pub fn new(config: &'a RunConfig, now: DateTime<Utc>) -> Self {
        Self {
            now,
            cutoff: now
                .checked_sub_signed(chrono::Duration::days(i64::from(config.days)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            whitelist: &config.whitelist,
            include_recent: config.include_recent,
            ignore_episodes: config.ignore_episodes,
            ignore_recent_episodes: config.ignore_recent_episodes,
        }
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    /// Evaluate a catalog snapshot. Decisions come out grouped by library,
    /// libraries and items in catalog order. Episodes of a series that is a
    /// candidate as a whole are not reported separately.
    pub fn evaluate(&self, items: &[MediaItem]) -> Vec<RetentionDecision> {
        let mut episodes_by_series: HashMap<&str, Vec<&MediaItem>> = HashMap::new();
        for item in items.iter().filter(|i| !i.is_virtual) {
            if let Some(series_id) = item.series_id() {
                episodes_by_series.entry(series_id).or_default().push(item);
            }
        }
        let series_ids: HashSet<&str> = items
            .iter()
            .filter(|i| i.kind == MediaKind::Series)
            .map(|i| i.id.as_str())
            .collect();

        let mut decisions = Vec::with_capacity(items.len());
        for item in items {
            match &item.kind {
                MediaKind::Movie => decisions.push(self.decide(item, !self.include_recent)),
                MediaKind::Series => {
                    let episodes = episodes_by_series
                        .get(item.id.as_str())
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    let series = self.decide_series(item, episodes);
                    let kept = !series.is_candidate();
                    decisions.push(series);
                    if kept && !self.ignore_episodes {
                        for episode in episodes {
                            decisions.push(self.decide(episode, !self.include_recent));
                        }
                    }
                }
                MediaKind::Episode(episode) => {
                    // episodes of a known series were handled with the series
                    let orphan = !series_ids.contains(episode.series_id.as_str());
                    if orphan && !item.is_virtual && !self.ignore_episodes {
                        decisions.push(self.decide(item, !self.include_recent));
                    }
                }
            }
        }

        group_by_library(decisions)
    }

    fn decide_series(&self, series: &MediaItem, episodes: &[&MediaItem]) -> RetentionDecision {
        let decision = self.decide(series, !self.include_recent);
        if !decision.is_candidate() {
            return decision;
        }

        for episode in episodes {
            let (verdict, reason) = self.assess(episode, !self.ignore_recent_episodes);
            if verdict == Verdict::Keep {
                let reason = Reason::ActiveEpisode {
                    episode: episode.to_string(),
                    cause: Box::new(reason),
                };
                debug!("keeping \"{series}\", {reason}");
                return RetentionDecision {
                    item: series.clone(),
                    verdict,
                    reason,
                };
            }
        }

        let latest = std::iter::once(series)
            .chain(episodes.iter().copied())
            .filter_map(|i| self.latest_play(i))
            .map(|(_, played)| played)
            .max();
        let reason = match latest {
            Some(last_played) => Reason::NotPlayedSince { last_played },
            None => Reason::NeverPlayed,
        };
        RetentionDecision { reason, ..decision }
    }

    fn decide(&self, item: &MediaItem, grace_period: bool) -> RetentionDecision {
        let (verdict, reason) = self.assess(item, grace_period);
        match (verdict, &reason) {
            (Verdict::Keep, _) => debug!("keeping \"{item}\", {reason}"),
            (Verdict::DeleteCandidate, Reason::NotPlayedSince { last_played }) => debug!(
                "\"{item}\" not played for {}",
                utils::age_str(last_played, &self.now)
            ),
            (Verdict::DeleteCandidate, _) => debug!("\"{item}\" {reason}"),
        }
        RetentionDecision {
            item: item.clone(),
            verdict,
            reason,
        }
    }

    fn assess(&self, item: &MediaItem, grace_period: bool) -> (Verdict, Reason) {
        if item.id.is_empty() {
            return keep(Reason::MissingMetadata("no identifier".to_string()));
        }
        if let Some(issue) = &item.metadata_issue {
            return keep(Reason::MissingMetadata(issue.clone()));
        }

        let whitelisted_viewer = item
            .playback
            .iter()
            .find(|(user, playback)| self.whitelist.contains(user) && playback.has_played());
        if let Some((user, _)) = whitelisted_viewer {
            return keep(Reason::WatchedByWhitelisted { user: user.clone() });
        }

        // a play exactly at the cutoff counts as not played within the window
        let latest = self.latest_play(item);
        if let Some((user, last_played)) = latest
            && last_played > self.cutoff
        {
            return keep(Reason::PlayedRecently {
                user: user.to_string(),
                last_played,
            });
        }

        if grace_period {
            match item.date_added {
                None => return keep(Reason::MissingMetadata("no date added".to_string())),
                Some(added) if added > self.cutoff => return keep(Reason::RecentlyAdded { added }),
                Some(_) => {}
            }
        }

        let reason = match latest {
            Some((_, last_played)) => Reason::NotPlayedSince { last_played },
            None => Reason::NeverPlayed,
        };
        (Verdict::DeleteCandidate, reason)
    }

    /// most recent timestamped play by a user outside the whitelist
    fn latest_play<'i>(&self, item: &'i MediaItem) -> Option<(&'i str, DateTime<Utc>)> {
        item.playback
            .iter()
            .filter(|(user, _)| !self.whitelist.contains(user))
            .filter_map(|(user, playback)| Some((user.as_str(), playback.last_played?)))
            .max_by_key(|(_, played)| *played)
    }
}

fn keep(reason: Reason) -> (Verdict, Reason) {
    (Verdict::Keep, reason)
}

/// Stable grouping: libraries in order of first appearance, items keep their
/// relative order.
pub fn group_by_library(decisions: Vec<RetentionDecision>) -> Vec<RetentionDecision> {
    let mut libraries: Vec<String> = Vec::new();
    for decision in &decisions {
        if !libraries.contains(&decision.item.library) {
            libraries.push(decision.item.library.clone());
        }
    }
    let mut decisions = decisions;
    decisions.sort_by_key(|d| libraries.iter().position(|l| *l == d.item.library));
    decisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{EpisodeRef, Playback, ProviderIds},
        config::{DeleteMode, LibraryFilter, ServerConfig},
    };
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - chrono::Duration::days(days)
    }

    fn config(whitelist: &[&str]) -> RunConfig {
        RunConfig {
            emby: ServerConfig::default(),
            sonarr: None,
            radarr: None,
            days: 90,
            whitelist: Whitelist::new(whitelist),
            libraries: LibraryFilter::All,
            delete_mode: DeleteMode::None,
            delete_files: false,
            dry_run: false,
            include_recent: false,
            ignore_episodes: false,
            ignore_recent_episodes: false,
            sort_by_size: false,
            schedule: None,
        }
    }

    fn movie(id: &str, library: &str) -> MediaItem {
        MediaItem {
            id: id.to_string(),
            title: format!("Movie {id}"),
            library: library.to_string(),
            kind: MediaKind::Movie,
            date_added: Some(days_ago(400)),
            playback: BTreeMap::new(),
            provider_ids: ProviderIds::default(),
            path: None,
            is_virtual: false,
            metadata_issue: None,
        }
    }

    fn series(id: &str) -> MediaItem {
        MediaItem {
            kind: MediaKind::Series,
            title: format!("Series {id}"),
            ..movie(id, "TV")
        }
    }

    fn episode(id: &str, series_id: &str, number: u32) -> MediaItem {
        MediaItem {
            kind: MediaKind::Episode(EpisodeRef {
                series_id: series_id.to_string(),
                series_title: format!("Series {series_id}"),
                series_tvdb_id: None,
                season: Some(1),
                episode: Some(number),
            }),
            ..movie(id, "TV")
        }
    }

    fn played_by(mut item: MediaItem, user: &str, days: i64) -> MediaItem {
        item.playback.insert(
            user.to_string(),
            Playback {
                last_played: Some(days_ago(days)),
                played: true,
                played_percentage: 100.0,
            },
        );
        item
    }

    fn evaluate(config: &RunConfig, items: &[MediaItem]) -> Vec<RetentionDecision> {
        RetentionPolicy::new(config, now()).evaluate(items)
    }

    fn single(config: &RunConfig, item: MediaItem) -> RetentionDecision {
        let mut decisions = evaluate(config, &[item]);
        assert_eq!(decisions.len(), 1);
        decisions.remove(0)
    }

    #[test]
    fn test_stale_play_by_regular_user_is_candidate() {
        let config = config(&["will"]);
        let item = played_by(movie("x", "Movies"), "jane", 120);
        let decision = single(&config, item);
        assert_eq!(decision.verdict, Verdict::DeleteCandidate);
        assert_eq!(
            decision.reason,
            Reason::NotPlayedSince {
                last_played: days_ago(120)
            }
        );
    }

    #[test]
    fn test_whitelisting_the_only_viewer_keeps_item() {
        let config = config(&["will", "Jane"]);
        let item = played_by(movie("x", "Movies"), "jane", 120);
        let decision = single(&config, item);
        assert_eq!(decision.verdict, Verdict::Keep);
        assert_eq!(
            decision.reason,
            Reason::WatchedByWhitelisted {
                user: "jane".to_string()
            }
        );
    }

    #[test]
    fn test_whitelisted_viewers_keep_regardless_of_timestamps() {
        let config = config(&["will"]);
        for days in [1, 89, 90, 91, 1000] {
            let item = played_by(movie("x", "Movies"), "will", days);
            assert_eq!(single(&config, item).verdict, Verdict::Keep, "{days} days");
        }
        // watched to completion without a timestamp
        let mut item = movie("y", "Movies");
        item.playback.insert(
            "will".to_string(),
            Playback {
                played: true,
                ..Default::default()
            },
        );
        assert_eq!(single(&config, item).verdict, Verdict::Keep);
    }

    #[test]
    fn test_whitelisted_play_is_not_compared_with_cutoff() {
        // will's recent play is not a "recent play" by a regular user
        let config = config(&["will"]);
        let item = played_by(played_by(movie("x", "Movies"), "will", 5), "jane", 200);
        let decision = single(&config, item);
        assert!(matches!(decision.reason, Reason::WatchedByWhitelisted { .. }));
    }

    #[test]
    fn test_never_played_old_item_is_candidate() {
        let decision = single(&config(&[]), movie("x", "Movies"));
        assert_eq!(decision.verdict, Verdict::DeleteCandidate);
        assert_eq!(decision.reason, Reason::NeverPlayed);
    }

    #[test]
    fn test_recent_play_keeps_item() {
        let item = played_by(movie("x", "Movies"), "jane", 10);
        let decision = single(&config(&[]), item);
        assert!(matches!(decision.reason, Reason::PlayedRecently { ref user, .. } if user == "jane"));
    }

    #[test]
    fn test_play_exactly_at_cutoff_is_stale() {
        let item = played_by(movie("x", "Movies"), "jane", 90);
        assert!(single(&config(&[]), item).is_candidate());
    }

    #[test]
    fn test_missing_timestamp_counts_as_never_played() {
        let mut item = movie("x", "Movies");
        item.playback.insert(
            "jane".to_string(),
            Playback {
                played: true,
                ..Default::default()
            },
        );
        let decision = single(&config(&[]), item);
        assert_eq!(decision.reason, Reason::NeverPlayed);
    }

    #[test]
    fn test_recently_added_grace_period() {
        let mut item = movie("x", "Movies");
        item.date_added = Some(days_ago(10));
        let decision = single(&config(&[]), item.clone());
        assert_eq!(
            decision.reason,
            Reason::RecentlyAdded {
                added: days_ago(10)
            }
        );

        let mut include_recent = config(&[]);
        include_recent.include_recent = true;
        assert!(single(&include_recent, item).is_candidate());
    }

    #[test]
    fn test_missing_metadata_keeps_item() {
        let mut no_date = movie("x", "Movies");
        no_date.date_added = None;
        assert!(matches!(
            single(&config(&[]), no_date).reason,
            Reason::MissingMetadata(_)
        ));

        let mut no_id = movie("", "Movies");
        no_id.title = "nameless".to_string();
        assert_eq!(single(&config(&[]), no_id).verdict, Verdict::Keep);

        let mut broken = movie("y", "Movies");
        broken.metadata_issue = Some("unparsable date".to_string());
        assert_eq!(single(&config(&[]), broken).verdict, Verdict::Keep);
    }

    #[test]
    fn test_series_kept_while_any_episode_is_active() {
        let items = vec![
            series("s"),
            episode("e1", "s", 1),
            played_by(episode("e2", "s", 2), "jane", 3),
        ];
        let decisions = evaluate(&config(&[]), &items);

        assert_eq!(decisions.len(), 3);
        assert_eq!(decisions[0].item.id, "s");
        assert!(matches!(decisions[0].reason, Reason::ActiveEpisode { .. }));
        // the stale episode on its own is a candidate, the active one is not
        assert!(decisions[1].is_candidate());
        assert_eq!(decisions[2].verdict, Verdict::Keep);
    }

    #[test]
    fn test_fully_stale_series_covers_its_episodes() {
        let items = vec![
            series("s"),
            played_by(episode("e1", "s", 1), "jane", 200),
            episode("e2", "s", 2),
        ];
        let decisions = evaluate(&config(&[]), &items);

        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].is_candidate());
        assert_eq!(
            decisions[0].reason,
            Reason::NotPlayedSince {
                last_played: days_ago(200)
            }
        );
    }

    #[test]
    fn test_ignore_episodes_reports_only_series() {
        let mut config = config(&[]);
        config.ignore_episodes = true;
        let items = vec![
            series("s"),
            episode("e1", "s", 1),
            played_by(episode("e2", "s", 2), "jane", 3),
            episode("orphan", "missing", 1),
        ];
        let decisions = evaluate(&config, &items);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].verdict, Verdict::Keep);
    }

    #[test]
    fn test_virtual_episodes_are_ignored() {
        let mut missing = played_by(episode("e2", "s", 2), "jane", 3);
        missing.is_virtual = true;
        let items = vec![series("s"), episode("e1", "s", 1), missing];
        let decisions = evaluate(&config(&[]), &items);
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].is_candidate());
    }

    #[test]
    fn test_recent_episode_keeps_series_unless_ignored() {
        let mut fresh = episode("e1", "s", 1);
        fresh.date_added = Some(days_ago(2));
        let items = vec![series("s"), fresh];

        let decisions = evaluate(&config(&[]), &items);
        assert!(matches!(decisions[0].reason, Reason::ActiveEpisode { .. }));

        let mut config = config(&[]);
        config.ignore_recent_episodes = true;
        let decisions = evaluate(&config, &items);
        assert!(decisions[0].is_candidate());
    }

    #[test]
    fn test_orphan_episode_evaluated_on_its_own() {
        let decisions = evaluate(&config(&[]), &[episode("e1", "gone", 1)]);
        assert_eq!(decisions.len(), 1);
        assert!(decisions[0].is_candidate());
    }

    #[test]
    fn test_huge_window_keeps_everything_played() {
        let mut config = config(&[]);
        config.days = u32::MAX;
        let policy = RetentionPolicy::new(&config, now());
        assert!(policy.cutoff() < days_ago(1_000_000));

        let item = played_by(movie("x", "Movies"), "jane", 5000);
        assert_eq!(policy.evaluate(&[item])[0].verdict, Verdict::Keep);
    }

    #[test]
    fn test_grouped_by_library_in_catalog_order() {
        let items = vec![
            movie("1", "Movies"),
            movie("2", "Kids"),
            movie("3", "Movies"),
            movie("4", "Kids"),
        ];
        let ids: Vec<String> = evaluate(&config(&[]), &items)
            .into_iter()
            .map(|d| d.item.id)
            .collect();
        assert_eq!(ids, vec!["1", "3", "2", "4"]);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let config = config(&["will"]);
        let items = vec![
            played_by(movie("1", "Movies"), "jane", 120),
            played_by(movie("2", "Movies"), "will", 120),
            movie("3", "Movies"),
            series("s"),
            played_by(episode("e1", "s", 1), "jane", 5),
            episode("e2", "s", 2),
        ];
        let policy = RetentionPolicy::new(&config, now());
        let first = policy.evaluate(&items);
        let second = policy.evaluate(&items);
        assert_eq!(first, second);

        let candidates: Vec<&str> = first
            .iter()
            .filter(|d| d.is_candidate())
            .map(|d| d.item.id.as_str())
            .collect();
        assert_eq!(candidates, vec!["1", "3", "e2"]);
    }
}
