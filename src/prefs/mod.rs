//! prefs
//!
//! The preferences collaborator: the last-viewed repository and the
//! signed-in username the metadata merge needs.
//!
//! # Design
//!
//! Preferences are an external concern; the engine consumes them through
//! the [`Preferences`] trait. [`FilePreferences`] persists to a TOML file
//! at the platform config directory (canonical write location
//! `<config>/hubsync/prefs.toml`); persistence failures are logged and
//! never propagated, since losing a preference write must not fail the
//! operation that triggered it. [`MemoryPreferences`] backs tests.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::core::RepoId;

/// Preferences consumed by the engine.
pub trait Preferences: Send + Sync {
    /// The repository last designated primary, if any.
    fn last_viewed_repository(&self) -> Option<RepoId>;

    /// Record the repository just designated primary.
    fn set_last_viewed_repository(&self, id: &RepoId);

    /// Login of the signed-in user, used to distinguish self-authored
    /// activity in metadata.
    fn username(&self) -> Option<String>;

    /// Record the signed-in user.
    fn set_username(&self, login: &str);
}

/// On-disk preference contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
struct PrefsData {
    last_viewed_repository: Option<RepoId>,
    username: Option<String>,
}

/// TOML-file-backed preferences.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    data: Mutex<PrefsData>,
}

impl FilePreferences {
    /// Load preferences from `path`, starting empty when the file does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PrefsData::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Load preferences from the platform config directory.
    pub fn at_default_location() -> anyhow::Result<Self> {
        let dir = dirs::config_dir().context("no config directory on this platform")?;
        Self::load(dir.join("hubsync").join("prefs.toml"))
    }

    fn save(&self, data: &PrefsData) {
        let result = (|| -> anyhow::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let text = toml::to_string_pretty(data).context("serializing preferences")?;
            std::fs::write(&self.path, text)
                .with_context(|| format!("writing {}", self.path.display()))?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::warn!("failed to persist preferences: {:#}", e);
        }
    }
}

impl Preferences for FilePreferences {
    fn last_viewed_repository(&self) -> Option<RepoId> {
        self.data.lock().unwrap().last_viewed_repository.clone()
    }

    fn set_last_viewed_repository(&self, id: &RepoId) {
        let mut data = self.data.lock().unwrap();
        data.last_viewed_repository = Some(id.clone());
        self.save(&data);
    }

    fn username(&self) -> Option<String> {
        self.data.lock().unwrap().username.clone()
    }

    fn set_username(&self, login: &str) {
        let mut data = self.data.lock().unwrap();
        data.username = Some(login.to_string());
        self.save(&data);
    }
}

/// In-memory preferences for tests and headless embedding.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    data: Mutex<PrefsData>,
}

impl MemoryPreferences {
    /// Create empty preferences.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create preferences with a signed-in username.
    pub fn with_username(login: &str) -> Self {
        let prefs = Self::new();
        prefs.set_username(login);
        prefs
    }
}

impl Preferences for MemoryPreferences {
    fn last_viewed_repository(&self) -> Option<RepoId> {
        self.data.lock().unwrap().last_viewed_repository.clone()
    }

    fn set_last_viewed_repository(&self, id: &RepoId) {
        self.data.lock().unwrap().last_viewed_repository = Some(id.clone());
    }

    fn username(&self) -> Option<String> {
        self.data.lock().unwrap().username.clone()
    }

    fn set_username(&self, login: &str) {
        self.data.lock().unwrap().username = Some(login.to_string());
    }
}
