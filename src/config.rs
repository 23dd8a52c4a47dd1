//! Configuration: the JSON blob handed to the native side and the TOML settings file
//!
//! [`ConfigBlob`] is serialized once per service creation or server launch and consumed by the
//! native constructor. [`Settings`] is the optional `mlflow-bridge.toml` the CLI reads defaults
//! from.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BridgeError, Result};

/// Name of the settings file looked up by [`Settings::discover`]
pub const SETTINGS_FILE: &str = "mlflow-bridge.toml";

/// Configuration blob understood by the native service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigBlob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_artifact_root: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_registry_store_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_address: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub python_command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub python_env: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_timeout",
        deserialize_with = "deserialize_timeout"
    )]
    pub shutdown_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_folder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_store_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ConfigBlob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blob for a tracking service backed by `store_uri`
    pub fn tracking(store_uri: impl Into<String>) -> Self {
        Self {
            tracking_store_uri: Some(store_uri.into()),
            ..Self::default()
        }
    }

    /// Blob for a model registry service backed by `store_uri`
    pub fn model_registry(store_uri: impl Into<String>) -> Self {
        Self {
            model_registry_store_uri: Some(store_uri.into()),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_default_artifact_root(mut self, root: impl Into<String>) -> Self {
        self.default_artifact_root = Some(root.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Serialize to the bytes passed across the boundary
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Decode a blob; empty input is the empty object
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(bytes)
            .map_err(|e| BridgeError::Config(format!("failed to parse JSON config: {}", e)))
    }
}

fn serialize_timeout<S: Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_str(&format_go_duration(*duration)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_timeout<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Nanos(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Nanos(nanos)) => Ok(Some(Duration::from_nanos(nanos))),
        Some(Raw::Text(text)) => parse_go_duration(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Parse a Go duration string such as `"300ms"`, `"1m"` or `"2h45m"`
pub fn parse_go_duration(input: &str) -> std::result::Result<Duration, String> {
    let text = input.trim();
    if text == "0" {
        return Ok(Duration::ZERO);
    }
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if text.starts_with('-') {
        return Err(format!("negative duration \"{}\"", input));
    }
    let mut rest = text.strip_prefix('+').unwrap_or(text);
    let mut total_nanos: f64 = 0.0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration \"{}\"", input))?;
        if number_len == 0 {
            return Err(format!("invalid duration \"{}\"", input));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid duration \"{}\"", input))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => return Err(format!("unknown unit \"{}\" in duration \"{}\"", unit, input)),
        };
        rest = &rest[unit_len..];
        total_nanos += value * scale;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Render a duration in a form `time.ParseDuration` accepts
pub fn format_go_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else if duration.as_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}

/// Settings file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub library: LibrarySettings,

    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibrarySettings {
    /// Directories searched for the shared library, in order
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Source tree used when the library has to be built
    #[serde(default)]
    pub source_dir: Option<PathBuf>,

    /// Whether stores delegate to the native library
    #[serde(default)]
    pub native_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: String,

    #[serde(default = "default_ready_timeout")]
    pub ready_timeout: String,

    /// Program launched as the delegate server for endpoints the native server lacks
    #[serde(default = "default_python_program")]
    pub python_program: String,

    #[serde(default)]
    pub python_env: Vec<String>,

    #[serde(default)]
    pub static_folder: Option<PathBuf>,

    #[serde(default)]
    pub version: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            shutdown_timeout: default_shutdown_timeout(),
            ready_timeout: default_ready_timeout(),
            python_program: default_python_program(),
            python_env: Vec::new(),
            static_folder: None,
            version: None,
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_shutdown_timeout() -> String {
    "1m".to_string()
}

fn default_ready_timeout() -> String {
    "30s".to_string()
}

fn default_python_program() -> String {
    "mlflow".to_string()
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
    }

    /// Parse settings from a TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| BridgeError::Config(format!("failed to parse settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Find and load the settings file from `start` or its parents; defaults when none exists
    pub fn discover(start: &Path) -> Result<Self> {
        let mut current = Some(start);

        while let Some(dir) = current {
            let candidate = dir.join(SETTINGS_FILE);
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "Loading settings");
                return Self::load(&candidate);
            }
            current = dir.parent();
        }

        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("shutdown_timeout", &self.server.shutdown_timeout),
            ("ready_timeout", &self.server.ready_timeout),
        ] {
            parse_go_duration(value)
                .map_err(|e| BridgeError::Config(format!("server.{}: {}", key, e)))?;
        }
        Ok(())
    }

    pub fn ready_timeout(&self) -> Duration {
        parse_go_duration(&self.server.ready_timeout).unwrap_or(crate::server::DEFAULT_READY_TIMEOUT)
    }

    /// Generate default settings file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate settings"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("failed to serialize settings: {}", e)))?;

        fs::write(path, content).map_err(BridgeError::from)
    }
}
