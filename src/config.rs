//! Option sources for ocr-relay using the prefer crate for discovery.
//!
//! Options are flat `key = value` pairs keyed by the names in
//! [`crate::ocr::keys`]. They can come from an options file (JSON, TOML or
//! YAML), from `OCR_RELAY_*` environment variables, or from explicit
//! `key=value` overrides, layered in that order of increasing priority.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ocr::{keys, OptionSource};

/// Prefix of environment variables that carry options.
pub const ENV_PREFIX: &str = "OCR_RELAY_";

/// Name prefer uses to discover the options file.
const CONFIG_NAME: &str = "ocr-relay";

/// Errors from loading options.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Failed to read options file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} options file {}: {message}", path.display())]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("Options file {} must contain a table of key/value pairs", path.display())]
    NotATable { path: PathBuf },

    #[error("Invalid option assignment '{0}'; expected key=value")]
    Assignment(String),
}

/// In-memory options, optionally loaded from a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionMap {
    values: HashMap<String, String>,
    /// Path to the file this was loaded from.
    source_path: Option<PathBuf>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Split a `key=value` assignment. The value may be empty or contain `=`.
    pub fn parse_assignment(assignment: &str) -> Result<(String, String), OptionsError> {
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(OptionsError::Assignment(assignment.to_string()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(OptionsError::Assignment(assignment.to_string()));
        }
        Ok((key.to_string(), value.to_string()))
    }

    /// Build a map from `key=value` assignments; later ones win.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for assignment in assignments {
            let (key, value) = Self::parse_assignment(assignment.as_ref())?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Load options from a file, choosing the format by extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, OptionsError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| OptionsError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| OptionsError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let value: Value = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        let Value::Object(table) = value else {
            return Err(OptionsError::NotATable {
                path: path.to_path_buf(),
            });
        };

        let mut map = Self::new();
        for (key, value) in table {
            if !keys::ALL.contains(&key.as_str()) {
                warn!("Unknown option '{}' in {}", key, path.display());
            }
            match scalar_to_string(&value) {
                Some(text) => map.insert(key, text),
                None => debug!("Skipping non-scalar option '{}'", key),
            }
        }

        map.source_path = Some(path.to_path_buf());
        Ok(map)
    }

    /// Discover an options file in the standard locations.
    ///
    /// Returns `None` when no file is found or the discovered file is unusable.
    pub async fn discover() -> Option<Self> {
        let pref_config = match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => pref_config,
            Err(_) => {
                debug!("No {} options file found", CONFIG_NAME);
                return None;
            }
        };

        let path = pref_config.source_path()?;
        match Self::load_from_path(path).await {
            Ok(map) => Some(map),
            Err(e) => {
                warn!("Ignoring options file: {}", e);
                None
            }
        }
    }
}

impl OptionSource for OptionMap {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Options read from `OCR_RELAY_*` environment variables.
///
/// `cloudApiKey` is read from `OCR_RELAY_CLOUD_API_KEY`.
#[derive(Debug, Clone)]
pub struct EnvOptions {
    prefix: String,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self::with_prefix(ENV_PREFIX)
    }
}

impl EnvOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable name for an option key.
    pub fn env_key(&self, key: &str) -> String {
        let mut name = self.prefix.clone();
        for (i, c) in key.chars().enumerate() {
            if c.is_ascii_uppercase() && i > 0 {
                name.push('_');
            }
            name.push(c.to_ascii_uppercase());
        }
        name
    }
}

impl OptionSource for EnvOptions {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.env_key(key)).ok()
    }
}

/// Ordered fallback across option sources.
///
/// The first layer holding a non-blank value for a key wins.
#[derive(Default)]
pub struct LayeredOptions {
    layers: Vec<Box<dyn OptionSource>>,
    source_path: Option<PathBuf>,
}

impl LayeredOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: impl OptionSource + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// Add an options file as the next layer, remembering where it came from.
    pub fn with_file(mut self, file: OptionMap) -> Self {
        if self.source_path.is_none() {
            self.source_path = file.source_path.clone();
        }
        self.with_layer(file)
    }

    /// Options file in use, if any.
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }
}

impl OptionSource for LayeredOptions {
    fn get(&self, key: &str) -> Option<String> {
        self.layers
            .iter()
            .filter_map(|layer| layer.get(key))
            .find(|value| !value.trim().is_empty())
    }
}

impl std::fmt::Debug for LayeredOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredOptions")
            .field("layers", &self.layers.len())
            .field("source_path", &self.source_path)
            .finish()
    }
}

/// Assemble the option layers used by the CLI.
///
/// Priority: `overrides` (`key=value`), then environment variables, then the
/// options file at `config_path` or one discovered by prefer.
pub async fn load_options(
    config_path: Option<&Path>,
    overrides: &[String],
) -> Result<LayeredOptions, OptionsError> {
    let overrides = OptionMap::from_assignments(overrides)?;

    let file = match config_path {
        Some(path) => Some(OptionMap::load_from_path(path).await?),
        None => OptionMap::discover().await,
    };

    let mut options = LayeredOptions::new()
        .with_layer(overrides)
        .with_layer(EnvOptions::default());
    if let Some(file) = file {
        if let Some(path) = file.source_path() {
            debug!("Using options file: {}", path.display());
        }
        options = options.with_file(file);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::option_string;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_env_key() {
        let env = EnvOptions::default();
        assert_eq!(env.env_key("cloudApiKey"), "OCR_RELAY_CLOUD_API_KEY");
        assert_eq!(env.env_key("ocrBackendMode"), "OCR_RELAY_OCR_BACKEND_MODE");
        assert_eq!(env.env_key("serverUrl"), "OCR_RELAY_SERVER_URL");
    }

    #[test]
    fn test_env_options_read_variables() {
        let env = EnvOptions::with_prefix("OCR_RELAY_TEST_ENV_");
        std::env::set_var("OCR_RELAY_TEST_ENV_CLOUD_MODEL", "vision-2");
        assert_eq!(env.get("cloudModel").as_deref(), Some("vision-2"));
        assert_eq!(env.get("cloudPrompt"), None);
        std::env::remove_var("OCR_RELAY_TEST_ENV_CLOUD_MODEL");
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            OptionMap::parse_assignment("cloudPrompt=a=b").unwrap(),
            ("cloudPrompt".to_string(), "a=b".to_string())
        );
        assert_eq!(
            OptionMap::parse_assignment("serverUrl=").unwrap(),
            ("serverUrl".to_string(), String::new())
        );
        assert!(OptionMap::parse_assignment("novalue").is_err());
        assert!(OptionMap::parse_assignment("=x").is_err());
    }

    #[test]
    fn test_layers_skip_blank_values() {
        let layered = LayeredOptions::new()
            .with_layer(OptionMap::new().with("serverUrl", "  "))
            .with_layer(OptionMap::new().with("serverUrl", "http://a/ocr").with("cloudModel", "m"))
            .with_layer(OptionMap::new().with("serverUrl", "http://b/ocr"));

        assert_eq!(layered.get("serverUrl").as_deref(), Some("http://a/ocr"));
        assert_eq!(option_string(&layered, "cloudModel").as_deref(), Some("m"));
        assert_eq!(layered.get("missing"), None);
    }

    #[tokio::test]
    async fn test_load_toml_stringifies_scalars() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ocr-relay.toml",
            concat!(
                "ocrBackendMode = \"cloud\"\n",
                "requestTimeoutSec = 45\n",
                "useDocUnwarping = true\n",
                "textRecScoreThresh = 0.5\n",
                "nested = { a = 1 }\n",
            ),
        );

        let map = OptionMap::load_from_path(&path).await.unwrap();
        assert_eq!(map.get("ocrBackendMode").as_deref(), Some("cloud"));
        assert_eq!(map.get("requestTimeoutSec").as_deref(), Some("45"));
        assert_eq!(map.get("useDocUnwarping").as_deref(), Some("true"));
        assert_eq!(map.get("textRecScoreThresh").as_deref(), Some("0.5"));
        assert_eq!(map.get("nested"), None);
        assert_eq!(map.source_path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write_file(&dir, "opts.yml", "cloudModel: vision-1\ncloudImageDetail: low\n");
        let map = OptionMap::load_from_path(&yaml).await.unwrap();
        assert_eq!(map.get("cloudModel").as_deref(), Some("vision-1"));
        assert_eq!(map.len(), 2);

        let json = write_file(&dir, "opts.json", r#"{"serverUrl": "http://h:1/"}"#);
        let map = OptionMap::load_from_path(&json).await.unwrap();
        assert_eq!(map.get("serverUrl").as_deref(), Some("http://h:1/"));
    }

    #[tokio::test]
    async fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write_file(&dir, "broken.json", "{not json");
        assert!(matches!(
            OptionMap::load_from_path(&broken).await,
            Err(OptionsError::Parse { format: "JSON", .. })
        ));

        let list = write_file(&dir, "list.json", "[1, 2]");
        assert!(matches!(
            OptionMap::load_from_path(&list).await,
            Err(OptionsError::NotATable { .. })
        ));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            OptionMap::load_from_path(&missing).await,
            Err(OptionsError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_options_priority() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ocr-relay.json",
            r#"{"cloudModel": "from-file", "cloudPrompt": "file prompt"}"#,
        );

        let options = load_options(Some(&path), &["cloudModel=from-flag".to_string()])
            .await
            .unwrap();
        assert_eq!(options.get("cloudModel").as_deref(), Some("from-flag"));
        assert_eq!(options.get("cloudPrompt").as_deref(), Some("file prompt"));
        assert_eq!(options.source_path(), Some(path.as_path()));

        assert!(matches!(
            load_options(Some(&path), &["oops".to_string()]).await,
            Err(OptionsError::Assignment(_))
        ));
    }
}
