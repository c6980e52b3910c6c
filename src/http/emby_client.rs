use super::{ResponseExt, base_url_with};
use crate::config::ServerConfig;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const PAGE_SIZE: usize = 200;

/// A client for the Emby media server API.
/// https://dev.emby.media/doc/restapi/index.html
#[derive(Clone)]
pub struct EmbyClient {
    client: Client,
    base_url: Url,
}

impl EmbyClient {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let ServerConfig { base_url, api_key } = config;
        let base_url = base_url_with(base_url, "emby/")?;
        let default_headers = auth_headers(api_key)?;
        let client = ClientBuilder::new()
            .default_headers(default_headers)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Get all media libraries ("virtual folders") of the server.
    pub async fn libraries(&self) -> anyhow::Result<Vec<VirtualFolder>> {
        let url = self.base_url.join("Library/VirtualFolders")?;
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

    /// Get all users.
    pub async fn users(&self) -> anyhow::Result<Vec<User>> {
        let url = self.base_url.join("Users")?;
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

    /// Get all items matching the filter, without any user specific data.
    pub async fn items(&self, filter: &ItemsFilter<'_>) -> anyhow::Result<Vec<Item>> {
        let url = self.base_url.join("Items")?;
        self.paginated_items(url, filter).await
    }

    /// Get all items matching the filter as seen by the given user, i.e. with
    /// that user's `UserData` (playback state) attached.
    pub async fn user_items(
        &self,
        user_id: &str,
        filter: &ItemsFilter<'_>,
    ) -> anyhow::Result<Vec<Item>> {
        let url = self.base_url.join(&format!("Users/{user_id}/Items"))?;
        self.paginated_items(url, filter).await
    }

    async fn paginated_items(&self, url: Url, filter: &ItemsFilter<'_>) -> anyhow::Result<Vec<Item>> {
        let url = &url;
        paginate(move |start_index| self.items_page(url, filter, start_index)).await
    }

    async fn items_page(
        &self,
        url: &Url,
        filter: &ItemsFilter<'_>,
        start_index: usize,
    ) -> anyhow::Result<ItemsResponse> {
        let response = self
            .client
            .get(url.clone())
            .query(filter)
            .query(&[("StartIndex", start_index), ("Limit", PAGE_SIZE)])
            .send()
            .await?
            .handle_error()
            .await?
            .json()
            .await?;
        Ok(response)
    }
}

/// Requests pages starting at the number of items fetched so far, until the
/// server's total is reached or it returns an empty page.
async fn paginate<F, Fut>(mut fetch_page: F) -> anyhow::Result<Vec<Item>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = anyhow::Result<ItemsResponse>>,
{
    let mut items = Vec::new();
    loop {
        let response = fetch_page(items.len()).await?;
        if response.items.is_empty() {
            break;
        }
        items.extend(response.items);
        if items.len() >= response.total_record_count {
            break;
        }
    }
    Ok(items)
}

fn auth_headers(api_key: &str) -> anyhow::Result<HeaderMap> {
    let mut auth_headers = HeaderMap::new();
    let mut header_value = HeaderValue::from_str(api_key)?;
    header_value.set_sensitive(true);
    auth_headers.insert("x-emby-token", header_value);
    Ok(auth_headers)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    total_record_count: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualFolder {
    pub name: String,
    pub item_id: Option<String>,
    pub collection_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemKind {
    Movie,
    Series,
    Episode,
    #[default]
    #[serde(other)]
    Other,
}

/// A catalog entry. Dates are kept as raw strings so that a single malformed
/// value does not fail the whole page; they are parsed by the catalog.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "Type", default)]
    pub kind: ItemKind,
    pub series_id: Option<String>,
    pub series_name: Option<String>,
    pub index_number: Option<u32>,
    pub parent_index_number: Option<u32>,
    pub location_type: Option<String>,
    pub date_created: Option<String>,
    pub path: Option<String>,
    pub provider_ids: Option<HashMap<String, String>>,
    pub user_data: Option<UserData>,
}

impl Item {
    /// Provider ids come back as `Tmdb`, `Tvdb`, `Imdb`, but the casing is
    /// not consistent across server versions.
    pub fn provider_id(&self, provider: &str) -> Option<&str> {
        self.provider_ids
            .as_ref()?
            .iter()
            .find(|(name, value)| name.eq_ignore_ascii_case(provider) && !value.is_empty())
            .map(|(_, value)| value.as_str())
    }

    pub fn is_virtual(&self) -> bool {
        self.location_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("virtual"))
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct UserData {
    pub last_played_date: Option<String>,
    #[serde(default)]
    pub played: bool,
    pub played_percentage: Option<f64>,
}

/// Filter for querying items. Serializes into query parameters.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsFilter<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recursive: Option<bool>,
    #[serde(
        serialize_with = "to_comma_separated",
        skip_serializing_if = "Option::is_none"
    )]
    include_item_types: Option<&'a [&'a str]>,
    #[serde(
        serialize_with = "to_comma_separated",
        skip_serializing_if = "Option::is_none"
    )]
    fields: Option<&'a [&'a str]>,
}

impl<'a> ItemsFilter<'a> {
    pub fn new() -> Self {
        Self {
            parent_id: None,
            recursive: None,
            include_item_types: None,
            fields: None,
        }
    }

    #[must_use]
    pub fn parent_id(mut self, parent_id: &'a str) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn recursive(mut self) -> Self {
        self.recursive = Some(true);
        self
    }

    #[must_use]
    pub fn include_item_types(mut self, types: &'a [&'a str]) -> Self {
        self.include_item_types = Some(types);
        self
    }

    #[must_use]
    pub fn fields(mut self, fields: &'a [&'a str]) -> Self {
        self.fields = Some(fields);
        self
    }

    /// everything under a library that the retention policy may act on
    pub fn library_contents(library_id: &'a str) -> Self {
        Self::new()
            .parent_id(library_id)
            .recursive()
            .include_item_types(&["Movie", "Series", "Episode"])
            .fields(&["ProviderIds", "DateCreated", "Path", "UserData"])
    }
}

fn to_comma_separated<'a, S>(
    values: &Option<&'a [&'a str]>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if let Some(values) = values
        && !values.is_empty()
    {
        let values = values.join(",");
        return serializer.serialize_some(&values);
    }
    serializer.serialize_none()
}
