//! Declarative category catalog for the recurring scheduler.
//!
//! Each category names its source endpoints, its cadence, the queue priority
//! its jobs get, and the option bundle (channels, avatars, voice) attached to
//! every payload. The built-in catalog can be replaced by a YAML file:
//!
//! ```yaml
//! categories:
//!   - name: live
//!     priority: 10
//!     every_minutes: 15
//!     sources:
//!       - https://www.bbc.com/news
//!     options:
//!       channels: [news_channel_live]
//!       avatars: [avatar_breaking]
//!       voice: urgent
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::job::{ContentOptions, ContentRequest};
use super::recurring::SchedulerError;

/// Priority used for categories the catalog does not know.
pub const DEFAULT_CATEGORY_PRIORITY: i32 = 5;

/// Firing period of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub every_minutes: u64,
}

impl Cadence {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.every_minutes * 60)
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.every_minutes {
            60 => write!(f, "hourly"),
            m if m % 60 == 0 => write!(f, "every {}h", m / 60),
            m => write!(f, "every {}m", m),
        }
    }
}

/// One category of sources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub name: String,
    pub priority: i32,
    pub every_minutes: u64,
    pub sources: Vec<String>,
    #[serde(default)]
    pub options: ContentOptions,
}

impl Category {
    pub fn cadence(&self) -> Cadence {
        Cadence {
            every_minutes: self.every_minutes,
        }
    }

    /// Payload for one endpoint of this category.
    pub fn request_for(&self, endpoint: &str) -> ContentRequest {
        ContentRequest::new(endpoint).with_options(self.options.clone())
    }

    fn validate(&self) -> Result<(), SchedulerError> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::Catalog(
                "category name cannot be empty".to_string(),
            ));
        }

        if self.every_minutes == 0 {
            return Err(SchedulerError::Catalog(format!(
                "category '{}' must have every_minutes greater than 0",
                self.name
            )));
        }

        if self.sources.is_empty() {
            return Err(SchedulerError::Catalog(format!(
                "category '{}' has no sources",
                self.name
            )));
        }

        for source in &self.sources {
            ContentRequest::new(source.as_str())
                .validate()
                .map_err(|reason| {
                    SchedulerError::Catalog(format!("category '{}': {}", self.name, reason))
                })?;
        }

        Ok(())
    }
}

/// The full set of scheduled categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryCatalog {
    pub categories: Vec<Category>,
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        let base = ContentOptions::default()
            .with_publish(true)
            .with_audio(true)
            .with_force_correction(false);

        let category = |name: &str,
                        priority: i32,
                        every_minutes: u64,
                        sources: &[&str],
                        channel: &str,
                        avatar: &str,
                        voice: &str| Category {
            name: name.to_string(),
            priority,
            every_minutes,
            sources: sources.iter().map(|s| s.to_string()).collect(),
            options: base
                .clone()
                .with_channels([channel])
                .with_avatars([avatar])
                .with_voice(voice),
        };

        let mut kids = category(
            "kids",
            1,
            360,
            &[
                "https://www.scholastic.com/",
                "https://www.timeforkids.com/",
                "https://www.nationalgeographic.com/for-kids/",
                "https://www.bbc.co.uk/newsround",
            ],
            "news_channel_kids",
            "avatar_fun",
            "friendly",
        );
        kids.options.enable_audio = false;

        Self {
            categories: vec![
                category(
                    "live",
                    10,
                    15,
                    &[
                        "https://www.bbc.com/news",
                        "https://www.reuters.com/",
                        "https://www.nytimes.com/",
                        "https://www.aljazeera.com/",
                        "https://www.theguardian.com/international",
                    ],
                    "news_channel_live",
                    "avatar_breaking",
                    "urgent",
                ),
                category(
                    "finance",
                    7,
                    60,
                    &[
                        "https://www.bloomberg.com/",
                        "https://www.wsj.com/",
                        "https://www.ft.com/",
                        "https://www.cnbc.com/",
                        "https://www.marketwatch.com/",
                    ],
                    "news_channel_finance",
                    "avatar_business",
                    "professional",
                ),
                category(
                    "world",
                    5,
                    360,
                    &[
                        "https://www.bbc.com/news/world",
                        "https://www.reuters.com/world/",
                        "https://www.aljazeera.com/news/",
                        "https://www.dw.com/en/top-stories/s-9097",
                    ],
                    "news_channel_world",
                    "avatar_global",
                    "neutral",
                ),
                category(
                    "regional",
                    3,
                    360,
                    &[
                        "https://www.thehindu.com/",
                        "https://indianexpress.com/",
                        "https://www.ndtv.com/",
                        "https://timesofindia.indiatimes.com/",
                    ],
                    "news_channel_regional",
                    "avatar_local",
                    "conversational",
                ),
                kids,
            ],
        }
    }
}

impl CategoryCatalog {
    pub fn new(categories: Vec<Category>) -> Result<Self, SchedulerError> {
        let catalog = Self { categories };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, SchedulerError> {
        let catalog: Self = serde_yaml::from_str(yaml)
            .map_err(|e| SchedulerError::Catalog(format!("invalid catalog YAML: {}", e)))?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::Catalog(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> Result<String, SchedulerError> {
        serde_yaml::to_string(self)
            .map_err(|e| SchedulerError::Catalog(format!("cannot serialize catalog: {}", e)))
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.categories.is_empty() {
            return Err(SchedulerError::Catalog(
                "catalog has no categories".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            category.validate()?;
            if !seen.insert(category.name.as_str()) {
                return Err(SchedulerError::Catalog(format!(
                    "duplicate category '{}'",
                    category.name
                )));
            }
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// First category listing `endpoint` among its sources.
    pub fn find_by_endpoint(&self, endpoint: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.sources.iter().any(|s| s == endpoint))
    }

    pub fn priority_for(&self, name: &str) -> i32 {
        self.get(name)
            .map(|c| c.priority)
            .unwrap_or(DEFAULT_CATEGORY_PRIORITY)
    }

    /// Number of (category, endpoint) pairs.
    pub fn trigger_count(&self) -> usize {
        self.categories.iter().map(|c| c.sources.len()).sum()
    }
}
