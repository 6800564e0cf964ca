//! User settings persisted between sessions as a flat JSON file.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("error reading or writing settings file")]
    Io(#[from] io::Error),

    #[error("error serializing settings JSON")]
    Json(#[from] serde_json::Error),
}

/// Directories and flags chosen by the user.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The root of the unpacked game files.
    pub game_directory: PathBuf,
    /// An optional directory checked before [game_directory](Self::game_directory).
    pub project_directory: Option<PathBuf>,
    /// Resolve loose files before archived entries with the same name.
    pub prefer_loose_files: bool,
    /// Load textures referenced by imported models.
    pub import_textures: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            game_directory: PathBuf::new(),
            project_directory: None,
            prefer_loose_files: false,
            import_textures: true,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults if the file
    /// does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Save settings to `path` as pretty printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
