use super::{ResponseExt, api_key_headers, base_url_with};
use crate::config::ServerConfig;
use reqwest::{Client, ClientBuilder, Url};
use serde::Deserialize;
use std::fmt::Debug;

/// A client for interacting with Sonarr API.
/// https://sonarr.tv/docs/api/#v3
pub struct SonarrClient {
    client: Client,
    base_url: Url,
}

impl SonarrClient {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let base_url = base_url_with(&config.base_url, "api/v3/")?;
        let default_headers = api_key_headers(&config.api_key)?;
        let client = ClientBuilder::new()
            .default_headers(default_headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Get the series for a given TVDB ID.
    /// https://sonarr.tv/docs/api/#v3/tag/series/GET/api/v3/series
    pub async fn series_by_tvdb_id(&self, tvdb_id: &str) -> anyhow::Result<Vec<SeriesInfo>> {
        let url = self.base_url.join("series")?;
        let response = self
            .client
            .get(url)
            .query(&[("tvdbId", tvdb_id)])
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;
        Ok(response)
    }

    /// Delete series by its ID, optionally together with its files.
    /// https://sonarr.tv/docs/api/#v3/tag/series/DELETE/api/v3/series/{id}
    pub async fn delete_series(&self, series_id: u64, delete_files: bool) -> anyhow::Result<()> {
        let url = self
            .base_url
            .join("series/")?
            .join(&series_id.to_string())?;
        self.client
            .delete(url)
            .query(&[("deleteFiles", delete_files)])
            .send()
            .await?
            .handle_error()
            .await?;
        Ok(())
    }

    /// Get episodes for a given series ID
    /// https://sonarr.tv/docs/api/#v3/tag/episode/GET/api/v3/episode
    pub async fn episodes_by_series_id(&self, series_id: u64) -> anyhow::Result<Vec<Episode>> {
        let url = self.base_url.join("episode")?;
        let response = self
            .client
            .get(url)
            .query(&[("seriesId", series_id)])
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;
        Ok(response)
    }

    /// Get a single episode file (path and size on disk).
    /// https://sonarr.tv/docs/api/#v3/tag/episodefile/GET/api/v3/episodefile/{id}
    pub async fn episode_file(&self, episode_file_id: u64) -> anyhow::Result<EpisodeFile> {
        let url = self
            .base_url
            .join("episodefile/")?
            .join(&episode_file_id.to_string())?;
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;
        Ok(response)
    }

    /// Delete an episode file from disk.
    /// https://sonarr.tv/docs/api/#v3/tag/episodefile/DELETE/api/v3/episodefile/{id}
    pub async fn delete_episode_file(&self, episode_file_id: u64) -> anyhow::Result<()> {
        let url = self
            .base_url
            .join("episodefile/")?
            .join(&episode_file_id.to_string())?;
        self.client
            .delete(url)
            .send()
            .await?
            .handle_error()
            .await?;
        Ok(())
    }

    /// Unmonitor episodes through the episodes monitor API
    /// https://sonarr.tv/docs/api/#v3/tag/episode/PUT/api/v3/episode/monitor
    pub async fn unmonitor_episodes(&self, episode_ids: &[u64]) -> anyhow::Result<()> {
        let url = self.base_url.join("episode/monitor")?;
        let request = serde_json::json!({
            "episodeIds": episode_ids,
            "monitored": false,
        });
        self.client
            .put(url)
            .json(&request)
            .send()
            .await?
            .handle_error()
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(Default))]
pub struct SeriesInfo {
    pub title: String,
    pub id: u64,
    pub path: Option<String>,
    pub statistics: Option<SeriesStatistics>,
}

impl SeriesInfo {
    pub fn size_on_disk(&self) -> u64 {
        self.statistics
            .as_ref()
            .map(|s| s.size_on_disk)
            .unwrap_or_default()
    }
}

impl Debug for SeriesInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.title, self.id)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(Default))]
pub struct SeriesStatistics {
    #[serde(default)]
    pub size_on_disk: u64,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: u64,
    pub season_number: u32,
    pub episode_number: u32,
    /// Sonarr reports `0` when there is no file on disk
    #[serde(default)]
    pub episode_file_id: u64,
}

impl Episode {
    pub fn file_id(&self) -> Option<u64> {
        (self.episode_file_id != 0).then_some(self.episode_file_id)
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeFile {
    pub id: u64,
    pub path: Option<String>,
    #[serde(default)]
    pub size: u64,
}
