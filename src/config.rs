// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading the daemon settings. A missing file falls back to
//! defaults; a malformed file is an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Headset gain scale runs 0..=15; the middle is a sane starting point.
const DEFAULT_GAIN: u16 = 7;

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Audio settings.
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter to serve, e.g. "hci0". Unset means whichever adapter the
    /// incoming connection names.
    pub adapter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Initial speaker gain pushed to a newly connected headset.
    pub speaker_gain: u16,

    /// Initial microphone gain pushed to a newly connected headset.
    pub microphone_gain: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            speaker_gain: DEFAULT_GAIN,
            microphone_gain: DEFAULT_GAIN,
        }
    }
}

impl Config {
    /// Load from the user config directory, falling back to defaults when
    /// no file exists.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hsp-gateway").join("config.toml"))
    }
}
