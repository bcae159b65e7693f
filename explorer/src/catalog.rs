use std::{
    collections::HashSet,
    fs::File,
    io::{self, Read},
    path::Path,
};

use shared::Quest;

const BUNDLED_QUESTS: &str = include_str!("../data/quests.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read quest catalog: {0}")]
    Io(#[from] io::Error),
    #[error("invalid quest catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate quest id {0}")]
    DuplicateId(String),
    #[error("quest {0} has an invalid coordinate")]
    InvalidCoordinate(String),
}

/// Static quest catalog supplied by the content layer.
#[derive(Debug, Clone, Default)]
pub struct QuestCatalog {
    quests: Vec<Quest>,
}

impl QuestCatalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, CatalogError> {
        let quests: Vec<Quest> = serde_json::from_reader(reader)?;
        Self::from_quests(quests)
    }

    pub fn from_quests(quests: Vec<Quest>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(quests.len());
        for quest in &quests {
            if !quest.point().is_finite()
                || !(-90.0..=90.0).contains(&quest.lat)
                || !(-180.0..=180.0).contains(&quest.lng)
            {
                return Err(CatalogError::InvalidCoordinate(quest.id.clone()));
            }
            if !seen.insert(quest.id.as_str()) {
                return Err(CatalogError::DuplicateId(quest.id.clone()));
            }
        }
        Ok(Self { quests })
    }

    /// Hampi sample catalog shipped with the crate.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_reader(BUNDLED_QUESTS.as_bytes())
    }

    pub fn get(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|quest| quest.id == id)
    }

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }
}
