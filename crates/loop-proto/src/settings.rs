use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Persistence for the user-facing "loop integration enabled" switch.
pub trait SettingsStore: Send + Sync {
    fn load_enabled(&self) -> bool;
    fn save_enabled(&self, enabled: bool) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentSettings {
    #[serde(default)]
    pub loop_integration: bool,
}

/// JSON-file backed settings. A missing or unreadable file means disabled.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> PersistentSettings {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return PersistentSettings::default();
        };
        match serde_json::from_str::<PersistentSettings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("settings: ignoring corrupt {}: {}", self.path.display(), e);
                PersistentSettings::default()
            }
        }
    }
}

impl SettingsStore for FileSettings {
    fn load_enabled(&self) -> bool {
        self.load().loop_integration
    }

    fn save_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        let mut settings = self.load();
        settings.loop_integration = enabled;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// In-process settings, for tests and embedders without a filesystem.
#[derive(Debug, Default)]
pub struct MemorySettings {
    enabled: AtomicBool,
}

impl MemorySettings {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn load_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn save_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        self.enabled.store(enabled, Ordering::Relaxed);
        Ok(())
    }
}
