// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Configuration utilities

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde")]
pub trait ConfigFile: Sized + Default + for<'de> Deserialize<'de> + Serialize {
    fn config_path() -> PathBuf;

    #[cfg(feature = "serde_json")]
    fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// A missing file yields the defaults.
    #[cfg(feature = "serde_json")]
    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    #[cfg(feature = "serde_json")]
    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            crate::file::ensure_dir(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialize config")?;

        crate::file::safe_write(path, content.as_bytes())
    }
}

/// Per-user configuration directory for `app`
pub fn config_dir(app: &str) -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app)
}

/// Per-user cache directory for `app`
pub fn cache_dir(app: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(app)
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("unable to determine the home directory")
}

#[cfg(all(test, feature = "serde_json"))]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        server: String,
        quiet: bool,
    }

    impl ConfigFile for Sample {
        fn config_path() -> PathBuf {
            PathBuf::from("/nonexistent/sample.json")
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Sample::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn saved_config_is_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let sample = Sample {
            server: "conda.example.org".to_string(),
            quiet: true,
        };

        sample.save_to(&path).unwrap();
        assert_eq!(Sample::load_from(&path).unwrap(), sample);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Sample::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }
}
