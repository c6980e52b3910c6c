use super::{LibraryManager, ManagerKind, ManagerRecord, RecordTarget};
use crate::{
    catalog::{EpisodeRef, MediaItem, MediaKind},
    config::ServerConfig,
    http::{Episode, SeriesInfo, SonarrClient},
};
use async_trait::async_trait;
use log::{debug, info};

pub struct Sonarr {
    client: SonarrClient,
}

impl Sonarr {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let client = SonarrClient::new(config)?;
        Ok(Self { client })
    }

    async fn series(&self, tvdb_id: &str) -> anyhow::Result<Option<SeriesInfo>> {
        let series = self.client.series_by_tvdb_id(tvdb_id).await?;
        debug!("Sonarr series for TVDB id {tvdb_id}: {series:?}");
        Ok(series.into_iter().next())
    }

    async fn episode_record(
        &self,
        item: &MediaItem,
        episode_ref: &EpisodeRef,
    ) -> anyhow::Result<Option<ManagerRecord>> {
        let Some(tvdb_id) = episode_ref.series_tvdb_id.as_deref() else {
            debug!("the show of \"{item}\" has no TVDB id, unable to look it up in Sonarr");
            return Ok(None);
        };
        let (Some(season), Some(number)) = (episode_ref.season, episode_ref.episode) else {
            debug!("\"{item}\" has no season or episode number, skipping");
            return Ok(None);
        };
        let Some(series) = self.series(tvdb_id).await? else {
            return Ok(None);
        };

        let episodes = self.client.episodes_by_series_id(series.id).await?;
        let Some(episode) = find_episode(&episodes, season, number) else {
            debug!("\"{item}\" not found among the episodes of {series:?}");
            return Ok(None);
        };
        let Some(file_id) = episode.file_id() else {
            debug!("\"{item}\" has no file in Sonarr");
            return Ok(None);
        };

        let file = self.client.episode_file(file_id).await?;
        Ok(Some(ManagerRecord {
            manager: ManagerKind::Sonarr,
            title: item.to_string(),
            target: RecordTarget::EpisodeFile {
                episode_id: episode.id,
                file_id: file.id,
            },
            size_on_disk: file.size,
            paths: file.path.into_iter().collect(),
        }))
    }
}

#[async_trait]
impl LibraryManager for Sonarr {
    async fn lookup(&self, item: &MediaItem) -> anyhow::Result<Option<ManagerRecord>> {
        match &item.kind {
            MediaKind::Episode(episode_ref) => self.episode_record(item, episode_ref).await,
            _ => {
                let Some(tvdb_id) = item.provider_ids.tvdb.as_deref() else {
                    debug!("\"{item}\" has no TVDB id, unable to look it up in Sonarr");
                    return Ok(None);
                };
                Ok(self.series(tvdb_id).await?.map(series_record))
            }
        }
    }

    async fn delete(&self, record: &ManagerRecord, delete_files: bool) -> anyhow::Result<()> {
        match record.target {
            RecordTarget::Series { id } => self.client.delete_series(id, delete_files).await,
            RecordTarget::EpisodeFile {
                episode_id,
                file_id,
            } => {
                // unmonitor first so that Sonarr does not download it again
                self.client.unmonitor_episodes(&[episode_id]).await?;
                if delete_files {
                    self.client.delete_episode_file(file_id).await?;
                } else {
                    info!("unmonitored \"{}\", its file was kept", record.title);
                }
                Ok(())
            }
            RecordTarget::Movie { .. } => {
                anyhow::bail!("Sonarr cannot delete movies, got {:?}", record.target)
            }
        }
    }
}

fn find_episode(episodes: &[Episode], season: u32, number: u32) -> Option<&Episode> {
    episodes
        .iter()
        .find(|e| e.season_number == season && e.episode_number == number)
}

fn series_record(series: SeriesInfo) -> ManagerRecord {
    ManagerRecord {
        manager: ManagerKind::Sonarr,
        size_on_disk: series.size_on_disk(),
        target: RecordTarget::Series { id: series.id },
        paths: series.path.into_iter().collect(),
        title: series.title,
    }
}
