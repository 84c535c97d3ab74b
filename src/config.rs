use std::path::Path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};
use crate::hal::recovery::pick_device;
use crate::hal::{ChannelSelection, SoundDriver, DEFAULT_BACKEND, DEFAULT_BUFFER_SIZE};

/// Persisted sound settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub version: String,
    /// Registry name of the backend
    pub backend: String,
    /// Preferred device; host default when unset or missing
    pub device: Option<String>,
    /// Requested frames per block
    pub buffer_size: u32,
    pub channels: ChannelSelection,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            backend: DEFAULT_BACKEND.to_string(),
            device: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            channels: ChannelSelection::default(),
        }
    }
}

impl SoundConfig {
    /// Load the config, writing the default one first if the file is missing
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await
                    .context("Failed to create config directory")?;
            }
            Self::default().save(path).await?;
        }

        let content = fs::read_to_string(path).await
            .context(format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        // Write to temporary file first
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json).await
            .context("Failed to write temporary config file")?;

        fs::rename(&temp_path, path).await
            .context("Failed to atomically update config file")?;

        Ok(())
    }

    /// Select device, buffer size and channels on `driver` and negotiate.
    ///
    /// Falls back to the host default device when the configured one is gone.
    pub fn apply(&self, driver: &mut dyn SoundDriver) -> bool {
        if driver.create_device_list(false) == 0 {
            return false;
        }

        let index = match pick_device(driver.devices(), self.device.as_deref()) {
            Some(index) => index,
            None => return false,
        };

        if let Some(wanted) = &self.device {
            if driver.devices()[index].name != *wanted {
                warn!(device = %wanted, "Configured device not found, using {}", driver.devices()[index].name);
            }
        }

        driver.select_channels(self.channels);
        driver.request_buffer_size(self.buffer_size);

        let name = driver.devices()[index].name.clone();
        if !driver.select_device_by_name(&name) {
            return false;
        }

        info!(
            device = %name,
            requested = self.buffer_size,
            frames = driver.properties().buffer_size,
            "Applied sound config"
        );
        true
    }
}
