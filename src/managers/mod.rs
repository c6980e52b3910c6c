mod radarr;
mod sonarr;

use crate::{
    catalog::{MediaItem, MediaKind},
    config::RunConfig,
};
use async_trait::async_trait;
use std::{collections::HashMap, fmt::Display};

pub use radarr::Radarr;
pub use sonarr::Sonarr;

/// An *arr application that owns media files on disk and can remove them.
#[async_trait]
pub trait LibraryManager {
    /// Find the manager's own record for a catalog item. `Ok(None)` means
    /// the manager does not know about the item.
    async fn lookup(&self, item: &MediaItem) -> anyhow::Result<Option<ManagerRecord>>;
    async fn delete(&self, record: &ManagerRecord, delete_files: bool) -> anyhow::Result<()>;
}

const SONARR_NAME: &str = "Sonarr";
const RADARR_NAME: &str = "Radarr";

#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
pub enum ManagerKind {
    Sonarr,
    Radarr,
}

impl ManagerKind {
    /// Movies live in Radarr, shows and their episodes in Sonarr.
    pub fn for_item(item: &MediaItem) -> Self {
        match item.kind {
            MediaKind::Movie => Self::Radarr,
            MediaKind::Series | MediaKind::Episode(_) => Self::Sonarr,
        }
    }
}

impl Display for ManagerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ManagerKind::Sonarr => SONARR_NAME,
            ManagerKind::Radarr => RADARR_NAME,
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerRecord {
    pub manager: ManagerKind,
    pub title: String,
    pub target: RecordTarget,
    pub size_on_disk: u64,
    pub paths: Vec<String>,
}

/// What a deletion acts on inside the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTarget {
    Movie { id: u64 },
    Series { id: u64 },
    EpisodeFile { episode_id: u64, file_id: u64 },
}

pub type GenericManager = Box<dyn LibraryManager + Send + Sync>;

/// Every configured library manager, keyed by kind.
#[derive(Default)]
pub struct LibraryManagers(HashMap<ManagerKind, GenericManager>);

impl LibraryManagers {
    pub fn from_config(config: &RunConfig) -> anyhow::Result<Self> {
        let mut managers: HashMap<ManagerKind, GenericManager> = HashMap::new();

        if let Some(sonarr_cfg) = &config.sonarr {
            managers.insert(ManagerKind::Sonarr, Box::new(Sonarr::new(sonarr_cfg)?));
        }

        if let Some(radarr_cfg) = &config.radarr {
            managers.insert(ManagerKind::Radarr, Box::new(Radarr::new(radarr_cfg)?));
        }

        Ok(Self(managers))
    }

    pub fn with(mut self, kind: ManagerKind, manager: GenericManager) -> Self {
        self.0.insert(kind, manager);
        self
    }

    pub fn get(&self, kind: ManagerKind) -> Option<&GenericManager> {
        self.0.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
