//! Key/value configuration store
//!
//! Keys are slash-separated paths such as `config/audio/enabled`. A JSON
//! document is flattened into this form on load, so
//!
//! ```json
//! { "config": { "audio": { "enabled": true } } }
//! ```
//!
//! answers `value_bool("config/audio/enabled", false)` with `true`.

use crate::{Result, SoundError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Game a configuration describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameType {
    /// Ultima VI
    #[default]
    #[serde(rename = "u6", alias = "ultima6")]
    Ultima6,
    /// Martian Dreams
    #[serde(rename = "md", alias = "martian")]
    MartianDreams,
    /// Savage Empire
    #[serde(rename = "se", alias = "savage")]
    SavageEmpire,
}

impl GameType {
    /// Per-game key prefix
    pub fn config_key(self) -> &'static str {
        match self {
            GameType::Ultima6 => "config/ultima6",
            GameType::MartianDreams => "config/martian",
            GameType::SavageEmpire => "config/savage",
        }
    }

}

/// Flat key/value configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    values: BTreeMap<String, Value>,
}

impl Configuration {
    /// Empty configuration; every lookup returns its default
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            log::warn!("config: cannot read {}: {}", path.display(), e);
            e
        })?;
        let config = Self::from_json_str(&text)?;
        log::info!(
            "config: loaded {} keys from {}",
            config.values.len(),
            path.display()
        );
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)
            .map_err(|e| SoundError::Config(format!("invalid JSON: {e}")))?;
        if !root.is_object() {
            return Err(SoundError::Config(
                "top level must be an object".to_string(),
            ));
        }
        let mut config = Self::new();
        flatten("", root, &mut config.values);
        Ok(config)
    }

    /// Write the configuration back as nested JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(&self.to_nested())
            .map_err(|e| SoundError::Config(format!("cannot serialise: {e}")))?;
        std::fs::write(path, text)?;
        log::info!("config: saved {} keys to {}", self.values.len(), path.display());
        Ok(())
    }

    fn to_nested(&self) -> Value {
        let mut root = Map::new();
        for (key, value) in &self.values {
            let mut parts = key.split('/').peekable();
            let mut node = &mut root;
            while let Some(part) = parts.next() {
                if parts.peek().is_none() {
                    node.insert(part.to_string(), value.clone());
                    break;
                }
                let child = node
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !child.is_object() {
                    *child = Value::Object(Map::new());
                }
                let Value::Object(map) = child else {
                    break;
                };
                node = map;
            }
        }
        Value::Object(root)
    }

    /// Whether `key` has a value
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Boolean at `key`
    ///
    /// Accepts JSON booleans, numbers and the strings `yes`/`no`/`true`/`false`.
    pub fn value_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().map_or(default, |n| n != 0),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "on" | "1" => true,
                "no" | "false" | "off" | "0" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// Integer at `key`, numeric strings included
    pub fn value_int(&self, key: &str, default: i64) -> i64 {
        match self.values.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// String at `key`; numbers and booleans are formatted
    pub fn value_string(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// Value at `key` deserialised as `T`, `None` when absent or mistyped
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?.clone();
        serde_json::from_value(value)
            .map_err(|e| log::debug!("config: {key}: {e}"))
            .ok()
    }

    /// Set a boolean
    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Value::Bool(value));
    }

    /// Set an integer
    pub fn set_int(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), Value::from(value));
    }

    /// Set a string
    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), Value::String(value.into()));
    }

    /// Game named by `config/GameType`, Ultima VI when absent or unknown
    pub fn game_type(&self) -> GameType {
        let raw = self.value_string("config/GameType", "");
        let normalised = Value::String(raw.trim().to_ascii_lowercase());
        serde_json::from_value(normalised).unwrap_or_else(|_| {
            if !raw.is_empty() {
                log::warn!("config: unknown GameType '{raw}', assuming Ultima VI");
            }
            GameType::Ultima6
        })
    }

    /// Per-game key prefix such as `config/ultima6`
    pub fn config_game_key(&self) -> &'static str {
        self.game_type().config_key()
    }

    /// `<game>/<suffix>`
    pub fn game_key(&self, suffix: &str) -> String {
        format!("{}/{}", self.config_game_key(), suffix)
    }

    /// Path of `name` inside the game's data directory
    ///
    /// A file matching `name` case-insensitively is preferred, since the
    /// original data ships in upper case.
    pub fn game_path(&self, name: &str) -> PathBuf {
        let dir = PathBuf::from(self.value_string(&self.game_key("gamedir"), ""));
        find_case_insensitive(&dir, name).unwrap_or_else(|| dir.join(name))
    }
}

fn flatten(prefix: &str, value: Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k
                } else {
                    format!("{prefix}/{k}")
                };
                flatten(&key, v, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other);
        }
    }
}

fn find_case_insensitive(dir: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    let exact = dir.join(name);
    if exact.exists() {
        return Some(exact);
    }
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().eq_ignore_ascii_case(name))
        .map(|e| e.path())
}
