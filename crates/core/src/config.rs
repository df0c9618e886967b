//! Session configuration.
//!
//! One parameterized design replaces per-variant forks: persistence, voice
//! output and theme are plain options.

use std::env;
use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::store::{
    FileStore, ObjectStore, ObjectStoreConfig, PersistenceBackend,
};

pub const DEFAULT_AI_NAME: &str = "PhoGPT";
pub const DEFAULT_DATA_DIR: &str = ".little-chat";
pub const DEFAULT_USER: &str = "default";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Color scheme of the renderer.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl FromStr for Theme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err(ConfigError::InvalidValue {
                key: "LITTLE_CHAT_THEME",
                value: s.to_owned(),
                expected: "light or dark",
            }),
        }
    }
}

/// Where chat history is kept.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum PersistenceKind {
    /// History lives as long as the process.
    #[default]
    None,
    /// JSON files under the data directory.
    LocalFile,
    /// An S3-compatible bucket.
    RemoteObjectStore,
}

impl FromStr for PersistenceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(PersistenceKind::None),
            "local-file" | "file" => Ok(PersistenceKind::LocalFile),
            "remote-object-store" | "s3" => {
                Ok(PersistenceKind::RemoteObjectStore)
            }
            _ => Err(ConfigError::InvalidValue {
                key: "LITTLE_CHAT_PERSISTENCE",
                value: s.to_owned(),
                expected: "none, local-file or remote-object-store",
            }),
        }
    }
}

impl Display for PersistenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceKind::None => write!(f, "none"),
            PersistenceKind::LocalFile => write!(f, "local-file"),
            PersistenceKind::RemoteObjectStore => {
                write!(f, "remote-object-store")
            }
        }
    }
}

/// Configuration of one chat session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Display name of the assistant.
    pub ai_name: String,
    pub theme: Theme,
    /// Speak assistant replies aloud.
    pub voice_output: bool,
    pub persistence: PersistenceKind,
    /// Root of the local file store and default export directory.
    pub data_dir: PathBuf,
    /// Owner of the persisted history.
    pub user: String,
    /// Upper bound for one model round trip.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    pub system_prompt: Option<String>,
    /// Persist after every mutating operation.
    pub auto_persist: bool,
    pub object_store: Option<ObjectStoreConfig>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ai_name: DEFAULT_AI_NAME.to_owned(),
            theme: Theme::default(),
            voice_output: false,
            persistence: PersistenceKind::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            user: DEFAULT_USER.to_owned(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            system_prompt: None,
            auto_persist: true,
            object_store: None,
        }
    }
}

impl ChatConfig {
    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value. Unset variables keep their defaults.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ai_name) = lookup("LITTLE_CHAT_AI_NAME") {
            config.ai_name = ai_name;
        }
        if let Some(theme) = lookup("LITTLE_CHAT_THEME") {
            config.theme = theme.parse()?;
        }
        if let Some(voice) = lookup("LITTLE_CHAT_VOICE") {
            config.voice_output = parse_bool("LITTLE_CHAT_VOICE", &voice)?;
        }
        if let Some(persistence) = lookup("LITTLE_CHAT_PERSISTENCE") {
            config.persistence = persistence.parse()?;
        }
        if let Some(data_dir) = lookup("LITTLE_CHAT_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(user) = lookup("LITTLE_CHAT_USER") {
            config.user = user;
        }
        if let Some(raw) = lookup("LITTLE_CHAT_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().ok().filter(|s| *s > 0);
            let Some(secs) = secs else {
                return Err(ConfigError::InvalidValue {
                    key: "LITTLE_CHAT_TIMEOUT_SECS",
                    value: raw,
                    expected: "a positive number of seconds",
                });
            };
            config.request_timeout = Duration::from_secs(secs);
        }
        config.system_prompt = lookup("LITTLE_CHAT_SYSTEM_PROMPT")
            .filter(|prompt| !prompt.trim().is_empty());
        if let Some(auto_persist) = lookup("LITTLE_CHAT_AUTO_PERSIST") {
            config.auto_persist =
                parse_bool("LITTLE_CHAT_AUTO_PERSIST", &auto_persist)?;
        }
        if config.persistence == PersistenceKind::RemoteObjectStore {
            config.object_store =
                Some(ObjectStoreConfig::from_lookup(&lookup)?);
        }
        Ok(config)
    }

    /// Opens the configured persistence backend, `None` when history is not
    /// persisted.
    pub fn open_backend(
        &self,
    ) -> Result<Option<Arc<dyn PersistenceBackend>>, ConfigError> {
        let backend: Arc<dyn PersistenceBackend> = match self.persistence {
            PersistenceKind::None => return Ok(None),
            PersistenceKind::LocalFile => {
                Arc::new(FileStore::new(self.data_dir.join("store")))
            }
            PersistenceKind::RemoteObjectStore => {
                let Some(config) = &self.object_store else {
                    return Err(ConfigError::Missing("S3_BUCKET"));
                };
                Arc::new(ObjectStore::new(config.clone()))
            }
        };
        Ok(Some(backend))
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_owned(),
            expected: "a boolean",
        }),
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<ChatConfig, ConfigError> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        ChatConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, ChatConfig::default());
        assert_eq!(config.ai_name, "PhoGPT");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert!(config.open_backend().unwrap().is_none());
    }

    #[test]
    fn test_recognized_options() {
        let config = config_from(&[
            ("LITTLE_CHAT_THEME", "Dark"),
            ("LITTLE_CHAT_VOICE", "yes"),
            ("LITTLE_CHAT_PERSISTENCE", "local-file"),
            ("LITTLE_CHAT_DATA_DIR", "/tmp/chats"),
            ("LITTLE_CHAT_USER", "alice"),
            ("LITTLE_CHAT_TIMEOUT_SECS", "5"),
            ("LITTLE_CHAT_SYSTEM_PROMPT", "Answer in Vietnamese."),
        ])
        .unwrap();
        assert_eq!(config.theme, Theme::Dark);
        assert!(config.voice_output);
        assert_eq!(config.persistence, PersistenceKind::LocalFile);
        assert_eq!(config.user, "alice");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(
            config.system_prompt.as_deref(),
            Some("Answer in Vietnamese.")
        );
        assert!(config.open_backend().unwrap().is_some());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("LITTLE_CHAT_THEME", "neon")]),
            Err(ConfigError::InvalidValue {
                key: "LITTLE_CHAT_THEME",
                ..
            })
        ));
        assert!(config_from(&[("LITTLE_CHAT_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[("LITTLE_CHAT_VOICE", "maybe")]).is_err());
    }

    #[test]
    fn test_remote_store_requires_bucket() {
        let err =
            config_from(&[("LITTLE_CHAT_PERSISTENCE", "remote-object-store")])
                .unwrap_err();
        assert_eq!(err, ConfigError::Missing("S3_BUCKET"));

        let config = config_from(&[
            ("LITTLE_CHAT_PERSISTENCE", "remote-object-store"),
            ("S3_BUCKET", "chats"),
        ])
        .unwrap();
        assert_eq!(config.object_store.unwrap().bucket, "chats");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ChatConfig = serde_json::from_str(
            r#"{
                "theme": "dark",
                "persistence": "remote-object-store",
                "request_timeout": 30
            }"#,
        )
        .unwrap();
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.persistence, PersistenceKind::RemoteObjectStore);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.ai_name, "PhoGPT");
    }
}
