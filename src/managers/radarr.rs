use super::{LibraryManager, ManagerKind, ManagerRecord, RecordTarget};
use crate::{
    catalog::MediaItem,
    config::ServerConfig,
    http::{Movie, RadarrClient},
};
use anyhow::bail;
use async_trait::async_trait;
use log::debug;

pub struct Radarr {
    client: RadarrClient,
}

impl Radarr {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let client = RadarrClient::new(config)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LibraryManager for Radarr {
    async fn lookup(&self, item: &MediaItem) -> anyhow::Result<Option<ManagerRecord>> {
        let Some(tmdb_id) = item.provider_ids.tmdb.as_deref() else {
            debug!(
                "\"{item}\" has no TMDB id (IMDb id {:?}), unable to look it up in Radarr",
                item.provider_ids.imdb
            );
            return Ok(None);
        };
        let movies = self.client.movies_by_tmdb_id(tmdb_id).await?;
        debug!("Radarr movies for TMDB id {tmdb_id}: {movies:?}");
        Ok(movies.into_iter().next().map(movie_record))
    }

    async fn delete(&self, record: &ManagerRecord, delete_files: bool) -> anyhow::Result<()> {
        let RecordTarget::Movie { id } = record.target else {
            bail!("Radarr can only delete movies, got {:?}", record.target);
        };
        self.client.delete_movie(id, delete_files).await
    }
}

fn movie_record(movie: Movie) -> ManagerRecord {
    let paths = movie
        .movie_file
        .and_then(|f| f.path)
        .or(movie.path)
        .into_iter()
        .collect();
    ManagerRecord {
        manager: ManagerKind::Radarr,
        title: movie.title,
        target: RecordTarget::Movie { id: movie.id },
        size_on_disk: movie.size_on_disk,
        paths,
    }
}
