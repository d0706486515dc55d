use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use templater::TemplateError;

/// File looked up in a views directory for configuration.
pub const CONFIG_FILE: &str = "templater.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ViewsConfig {
    /// File extension of view files, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Maximum nesting of nodes and views while parsing and compiling.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Extra view directories per namespace, relative to the views root.
    /// Views of a namespace are named `namespace:view`; the views root is
    /// always the first directory of the `default` namespace.
    #[serde(default)]
    pub namespaces: BTreeMap<String, Vec<PathBuf>>,
}

fn default_extension() -> String {
    "html".to_string()
}

fn default_max_depth() -> usize {
    templater::DEFAULT_MAX_DEPTH
}

impl Default for ViewsConfig {
    fn default() -> Self {
        ViewsConfig {
            extension: default_extension(),
            max_depth: default_max_depth(),
            namespaces: BTreeMap::new(),
        }
    }
}

impl ViewsConfig {
    pub fn from_toml(text: &str) -> Result<Self, TemplateError> {
        toml::from_str(text).map_err(|e| TemplateError::Custom(format!("invalid configuration: {}", e)))
    }

    /// Load `templater.toml` from `dir`, falling back to defaults when it is absent.
    pub fn load_dir(dir: &Path) -> Result<Self, TemplateError> {
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(ViewsConfig::default());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| TemplateError::Io(format!("cannot read '{}': {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded views configuration");
        ViewsConfig::from_toml(&text)
    }
}
