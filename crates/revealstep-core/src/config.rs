#![forbid(unsafe_code)]

//! Plugin configuration.
//!
//! The host hands over its whole configuration object as JSON. Plugin options
//! live under the `reveald3` key; `viewDistance` and `loop` may be set either
//! there or at the top level, and the plugin value wins.
//!
//! | Option | Default | Meaning |
//! |--------|---------|---------|
//! | `runLastState` | `true` | Replay the last step when re-entering a slide backwards |
//! | `onSlideChangedDelay` | `0` | Milliseconds before arrival transitions fire |
//! | `mapPath` | none | Path prefix for resources (`true` means `"src"`) |
//! | `tryFallbackURL` | `false` | Probe the prefixed path and fall back to the bare one |
//! | `disableCheckFile` | `false` | Skip the probe even when falling back is enabled |
//! | `keepIframe` | `false` | Keep foreground surfaces alive after leaving their slide |
//! | `viewDistance` | `3` | Preload radius for background surfaces |
//! | `loop` | `false` | Whether the deck wraps around horizontally |

use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default preload radius, matching the host's own default.
pub const DEFAULT_VIEW_DISTANCE: u32 = 3;

/// Preload radius used while the overview grid is shown.
pub const OVERVIEW_VIEW_DISTANCE: u32 = 10;

/// Prefix used when `mapPath` is `true`.
pub const DEFAULT_MAP_PATH: &str = "src";

/// Configuration decoding error.
#[derive(Debug)]
pub enum ConfigError {
    /// The JSON document could not be decoded.
    Json(serde_json::Error),
    /// One top-level key held a value of the wrong shape.
    Field {
        key: &'static str,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "invalid configuration: {e}"),
            Self::Field { key, source } => {
                write!(f, "invalid configuration: `{key}`: {source}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) | Self::Field { source: e, .. } => Some(e),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// `mapPath` accepts either a boolean shorthand or an explicit prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MapPath {
    Enabled(bool),
    Prefix(String),
}

impl MapPath {
    /// The prefix this setting stands for; empty when disabled.
    #[must_use]
    pub fn prefix(&self) -> &str {
        match self {
            Self::Enabled(true) => DEFAULT_MAP_PATH,
            Self::Enabled(false) => "",
            Self::Prefix(p) => p,
        }
    }
}

/// Options under the `reveald3` key of the host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginConfig {
    pub run_last_state: bool,
    /// Milliseconds.
    pub on_slide_changed_delay: u64,
    pub map_path: Option<MapPath>,
    #[serde(rename = "tryFallbackURL")]
    pub try_fallback_url: bool,
    pub disable_check_file: bool,
    pub keep_iframe: bool,
    pub view_distance: Option<u32>,
    #[serde(rename = "loop")]
    pub loop_slides: Option<bool>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            run_last_state: true,
            on_slide_changed_delay: 0,
            map_path: None,
            try_fallback_url: false,
            disable_check_file: false,
            keep_iframe: false,
            view_distance: None,
            loop_slides: None,
        }
    }
}

impl PluginConfig {
    /// Decode plugin options from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The subset of the host configuration the engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    pub view_distance: u32,
    #[serde(rename = "loop")]
    pub loop_slides: bool,
    pub reveald3: PluginConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            view_distance: DEFAULT_VIEW_DISTANCE,
            loop_slides: false,
            reveald3: PluginConfig::default(),
        }
    }
}

impl HostConfig {
    /// Decode the host's configuration object. Unknown keys are ignored.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode `viewDistance`, `loop` and `reveald3` independently.
    ///
    /// A key whose value does not decode keeps its default and is reported;
    /// the other keys are still applied.
    pub fn from_json_lenient(json: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Self::default();
        let mut errors = Vec::new();
        let root: Map<String, Value> = match serde_json::from_str(json) {
            Ok(root) => root,
            Err(e) => {
                errors.push(ConfigError::Json(e));
                return (config, errors);
            }
        };
        decode_key(&root, "viewDistance", &mut config.view_distance, &mut errors);
        decode_key(&root, "loop", &mut config.loop_slides, &mut errors);
        decode_key(&root, "reveald3", &mut config.reveald3, &mut errors);
        (config, errors)
    }
}

fn decode_key<T: DeserializeOwned>(
    root: &Map<String, Value>,
    key: &'static str,
    slot: &mut T,
    errors: &mut Vec<ConfigError>,
) {
    let Some(value) = root.get(key) else {
        return;
    };
    match T::deserialize(value) {
        Ok(decoded) => *slot = decoded,
        Err(source) => errors.push(ConfigError::Field { key, source }),
    }
}

/// Fully resolved engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Replay the last step on backward re-entry.
    pub run_last_state: bool,
    pub arrival_delay: Duration,
    /// Resource prefix, empty when unset.
    pub map_path: String,
    /// Probe the prefixed path before embedding and fall back on failure.
    pub probe_resources: bool,
    /// Keep foreground surfaces alive after their slide is left.
    pub keep_alive: bool,
    pub view_distance: u32,
    pub loop_slides: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&HostConfig::default())
    }
}

impl From<&HostConfig> for EngineConfig {
    fn from(host: &HostConfig) -> Self {
        let plugin = &host.reveald3;
        let map_path = plugin
            .map_path
            .as_ref()
            .map(|m| m.prefix().to_owned())
            .unwrap_or_default();
        let keep_alive = plugin.keep_iframe;
        Self {
            // A live document already holds its last state.
            run_last_state: plugin.run_last_state && !keep_alive,
            arrival_delay: Duration::from_millis(plugin.on_slide_changed_delay),
            probe_resources: plugin.try_fallback_url
                && !plugin.disable_check_file
                && !map_path.is_empty(),
            map_path,
            keep_alive,
            view_distance: plugin.view_distance.unwrap_or(host.view_distance),
            loop_slides: plugin.loop_slides.unwrap_or(host.loop_slides),
        }
    }
}

impl EngineConfig {
    /// Decode and resolve the host's configuration object.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(Self::from(&HostConfig::from_json(json)?))
    }

    /// Like [`EngineConfig::from_json`], but a malformed key only resets that
    /// key. See [`HostConfig::from_json_lenient`].
    pub fn from_json_lenient(json: &str) -> (Self, Vec<ConfigError>) {
        let (host, errors) = HostConfig::from_json_lenient(json);
        (Self::from(&host), errors)
    }
}
