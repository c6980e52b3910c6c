use super::{ResponseExt, api_key_headers, base_url_with};
use crate::config::ServerConfig;
use reqwest::{Client, ClientBuilder, Url};
use serde::Deserialize;
use std::fmt::Debug;

/// A client for interacting with Radarr API.
/// https://radarr.video/docs/api/
pub struct RadarrClient {
    client: Client,
    base_url: Url,
}

impl RadarrClient {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let base_url = base_url_with(&config.base_url, "api/v3/")?;
        let default_headers = api_key_headers(&config.api_key)?;
        let client = ClientBuilder::new()
            .default_headers(default_headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Get the movies for a given TMDB ID.
    /// https://radarr.video/docs/api/#/Movie/get_api_v3_movie
    pub async fn movies_by_tmdb_id(&self, tmdb_id: &str) -> anyhow::Result<Vec<Movie>> {
        let url = self.base_url.join("movie")?;
        let response = self
            .client
            .get(url)
            .query(&[("tmdbId", tmdb_id)])
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;
        Ok(response)
    }

    /// Delete a movie by its ID, optionally together with its files.
    /// https://radarr.video/docs/api/#/Movie/delete_api_v3_movie__id_
    pub async fn delete_movie(&self, movie_id: u64, delete_files: bool) -> anyhow::Result<()> {
        let url = self.base_url.join("movie/")?.join(&movie_id.to_string())?;
        self.client
            .delete(url)
            .query(&[("deleteFiles", delete_files)])
            .send()
            .await?
            .handle_error()
            .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub title: String,
    pub id: u64,
    pub path: Option<String>,
    #[serde(default)]
    pub size_on_disk: u64,
    pub movie_file: Option<MovieFile>,
}

impl Debug for Movie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.title, self.id)
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MovieFile {
    pub path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deser_movie() -> anyhow::Result<()> {
        let raw = r#"[{
            "title": "Heat",
            "id": 12,
            "tmdbId": 949,
            "hasFile": true,
            "path": "/movies/Heat (1995)",
            "sizeOnDisk": 4294967296,
            "movieFile": {"path": "/movies/Heat (1995)/Heat.mkv", "size": 4294967296}
        }]"#;
        let movies: Vec<Movie> = serde_json::from_str(raw)?;
        let movie = &movies[0];
        assert_eq!(format!("{movie:?}"), "Heat(12)");
        assert_eq!(movie.size_on_disk, 4_294_967_296);
        assert_eq!(
            movie.movie_file.as_ref().and_then(|f| f.path.as_deref()),
            Some("/movies/Heat (1995)/Heat.mkv")
        );
        Ok(())
    }

    #[test]
    fn test_deser_movie_without_file() -> anyhow::Result<()> {
        let raw = r#"{"title": "Upcoming", "id": 3}"#;
        let movie: Movie = serde_json::from_str(raw)?;
        assert_eq!(movie.size_on_disk, 0);
        assert!(movie.movie_file.is_none());
        Ok(())
    }
}
