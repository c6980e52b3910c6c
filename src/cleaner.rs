use crate::{
    catalog::Catalog,
    config::RunConfig,
    executor::Executor,
    http::EmbyClient,
    managers::LibraryManagers,
    prompt::ConsolePrompt,
    retention::RetentionPolicy,
    scheduler::Job,
};
use async_trait::async_trait;
use chrono::Utc;
use log::info;

/// One full cleanup cycle: fetch the catalog, decide what is stale, act on it.
pub struct MediaCleaner {
    emby: EmbyClient,
    managers: LibraryManagers,
    config: RunConfig,
}

impl MediaCleaner {
    pub fn new(config: RunConfig) -> anyhow::Result<Self> {
        let emby = EmbyClient::new(&config.emby)?;
        let managers = LibraryManagers::from_config(&config)?;
        if managers.is_empty() {
            info!("neither Sonarr nor Radarr is configured, media will only be reported");
        }
        Ok(Self {
            emby,
            managers,
            config,
        })
    }

    pub async fn cleanup(&self) -> anyhow::Result<()> {
        let catalog = Catalog::fetch(&self.emby, &self.config).await?;

        let policy = RetentionPolicy::new(&self.config, Utc::now());
        info!(
            "looking for media not played since {}",
            policy.cutoff().format("%Y-%m-%d %H:%M")
        );
        let decisions = policy.evaluate(&catalog.items);

        Executor::new(&self.managers, &ConsolePrompt, &self.config)
            .execute(&decisions)
            .await?;
        Ok(())
    }

    /// Print the media server's libraries.
    pub async fn list_libraries(&self) -> anyhow::Result<()> {
        let libraries = self.emby.libraries().await?;
        if libraries.is_empty() {
            info!("no libraries found");
        }
        for library in libraries {
            info!(
                "library \"{}\" ({})",
                library.name,
                library.collection_type.as_deref().unwrap_or("mixed")
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Job for MediaCleaner {
    async fn run(&self) -> anyhow::Result<()> {
        self.cleanup().await
    }
}
