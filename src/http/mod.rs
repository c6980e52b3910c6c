pub mod emby_client;
pub mod radarr_client;
pub mod sonarr_client;

pub use emby_client::{EmbyClient, Item, ItemKind, ItemsFilter, User, UserData, VirtualFolder};
pub use radarr_client::{Movie, RadarrClient};
pub use sonarr_client::{Episode, SeriesInfo, SonarrClient};

use anyhow::bail;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Response, Url};

trait ResponseExt {
    async fn handle_error(self) -> anyhow::Result<Response>;
}

impl ResponseExt for Response {
    async fn handle_error(self) -> anyhow::Result<Response> {
        let url = self.url();
        if self.status().is_success() {
            debug!("request to {url} succeeded");
            Ok(self)
        } else {
            let status = self.status();
            let url = url.clone();
            let body = self.text().await?;
            bail!("request to {url} failed with status {status}: {body}")
        }
    }
}

/// Parses a user supplied server url and appends `path`, keeping any base
/// path the server is mounted under (e.g. behind a reverse proxy).
fn base_url_with(base_url: &str, path: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let with_slash = format!("{}/", url.path());
        url.set_path(&with_slash);
    }
    Ok(url.join(path)?)
}

/// `X-Api-Key` header shared by Sonarr and Radarr
fn api_key_headers(api_key: &str) -> anyhow::Result<HeaderMap> {
    let mut default_headers = HeaderMap::new();
    let mut header_value = HeaderValue::from_str(api_key)?;
    header_value.set_sensitive(true);
    default_headers.insert("x-api-key", header_value);
    Ok(default_headers)
}
