use anyhow::Result;
use tracing::info;

use crate::{NewFilter, Storage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
}

/// The catalog a fresh kiosk starts with.
pub fn default_filters() -> Vec<NewFilter> {
    vec![
        NewFilter {
            name: "none".into(),
            display_name: "No Filter".into(),
            description: Some("Shows the live camera feed without background removal.".into()),
            background_image: None,
            icon: Some("📷".into()),
            is_active: true,
            sort_order: 0,
        },
        NewFilter {
            name: "flower".into(),
            display_name: "Flower Garden".into(),
            description: Some("Replaces the background with a flower garden.".into()),
            background_image: Some("/images/backgrounds/flower-garden.jpg".into()),
            icon: Some("🌸".into()),
            is_active: true,
            sort_order: 1,
        },
        NewFilter {
            name: "space".into(),
            display_name: "Outer Space".into(),
            description: Some("Replaces the background with a starfield.".into()),
            background_image: Some("/images/backgrounds/space.jpg".into()),
            icon: Some("🚀".into()),
            is_active: true,
            sort_order: 2,
        },
        NewFilter {
            name: "forest".into(),
            display_name: "Forest".into(),
            description: Some("Replaces the background with a forest clearing.".into()),
            background_image: Some("/images/backgrounds/forest.jpg".into()),
            icon: Some("🌲".into()),
            is_active: true,
            sort_order: 3,
        },
    ]
}

impl Storage {
    /// Inserts the default catalog when the table is empty. Returns how many
    /// filters were created.
    pub async fn seed_default_filters(&self) -> Result<usize> {
        let existing = self.count_filters().await?;
        if existing > 0 {
            info!(existing, "filter catalog already populated; skipping seed");
            return Ok(0);
        }

        let defaults = default_filters();
        for filter in &defaults {
            self.create_filter(filter).await?;
            info!(name = %filter.name, "seeded filter");
        }
        Ok(defaults.len())
    }

    /// Upserts the default catalog, keeping usage statistics of filters that
    /// already exist.
    pub async fn sync_default_filters(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for filter in default_filters() {
            if self.update_filter_details(&filter).await? {
                report.updated += 1;
                info!(name = %filter.name, "updated default filter");
            } else {
                self.create_filter(&filter).await?;
                report.created += 1;
                info!(name = %filter.name, "created default filter");
            }
        }
        Ok(report)
    }
}
