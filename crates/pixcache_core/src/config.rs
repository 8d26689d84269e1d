//! Render configuration.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonschema::Validator;
use pixcache_loader::ResourceOptions;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../schemas/v1/render-config.json");
static CONFIG_SCHEMA: OnceLock<Result<Validator, String>> = OnceLock::new();

fn default_logging() -> bool {
    true
}

/// Options of one render, as the host pipeline passes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    /// Resource policy of the cache created for the render.
    #[serde(flatten)]
    pub resources: ResourceOptions,

    /// Reuse cached mirrors between renders.
    #[serde(default)]
    pub use_cache: bool,

    /// Named cache instance to reuse across renders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reuse_cache: Option<String>,

    /// Key of the render frame kept between renders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_name: Option<String>,

    /// Reference slot inside a kept frame, written `attribute=value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_selector: Option<String>,

    /// Events from the render's cache instance and its loads. On by default.
    #[serde(default = "default_logging")]
    pub logging: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            resources: ResourceOptions::default(),
            use_cache: false,
            reuse_cache: None,
            render_name: None,
            replace_selector: None,
            logging: true,
        }
    }
}

impl RenderConfig {
    /// Loads configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses configuration from JSON text with schema validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ConfigError::Json(e.to_string()))?;

        let schema = CONFIG_SCHEMA
            .get_or_init(|| {
                let schema_json: serde_json::Value =
                    serde_json::from_str(SCHEMA_JSON).map_err(|e| e.to_string())?;
                Validator::new(&schema_json).map_err(|e| e.to_string())
            })
            .as_ref()
            .map_err(|e| ConfigError::Schema(e.clone()))?;

        if let Err(e) = schema.validate(&value) {
            return Err(ConfigError::Validation(format!(
                "{} at {}",
                e,
                e.instance_path()
            )));
        }

        serde_json::from_value(value).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Name of the cache instance for this render.
    ///
    /// `reuseCache` when set, otherwise a fresh random hex name.
    pub fn instance_name(&self) -> String {
        if let Some(name) = &self.reuse_cache {
            return name.clone();
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        format!("{:x}", rand::thread_rng().gen_range(0..=1000) + now)
    }

    /// The reference slot as `(attribute, value)`.
    pub fn reference_slot(&self) -> Option<(&str, &str)> {
        self.replace_selector.as_deref()?.split_once('=')
    }

    /// Fast mode reuses a kept frame and swaps a fresh mirror into its slot.
    pub fn fast_mode(&self) -> bool {
        self.render_name.is_some() && self.reference_slot().is_some()
    }
}
