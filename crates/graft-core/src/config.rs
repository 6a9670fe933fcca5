use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(String),
}

/// Dispatch pattern a plugin export is invoked with.
///
/// The pattern is always taken from the descriptor's explicit `type` field,
/// never inferred from the shape of the resolved export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PluginType {
    #[serde(rename = "ls")]
    Ls,
    #[serde(rename = "program")]
    #[default]
    Program,
    #[serde(rename = "config")]
    Config,
    #[serde(rename = "checker")]
    Checker,
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "compilerOptions")]
    CompilerOptions,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::Ls => "ls",
            PluginType::Program => "program",
            PluginType::Config => "config",
            PluginType::Checker => "checker",
            PluginType::Raw => "raw",
            PluginType::CompilerOptions => "compilerOptions",
        }
    }
}

/// Declarative descriptor selecting and configuring one transformer plugin.
///
/// Descriptors are read from the project configuration's `plugins` array and
/// are immutable once read. Their position in the array is their identity:
/// every derived transformer bucket preserves that order.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Display name used when reporting errors for this descriptor.
    #[serde(default)]
    pub name: Option<String>,

    /// Module specifier of the transformer to load (path or package name).
    #[serde(default)]
    pub transform: Option<String>,

    /// Named export to use. The default export is used when absent.
    #[serde(default)]
    pub import: Option<String>,

    /// Dispatch pattern for the export (defaults to `program`).
    #[serde(rename = "type", default)]
    pub plugin_type: Option<PluginType>,

    /// Place the produced transformer in the `after` bucket.
    #[serde(default)]
    pub after: bool,

    /// Place the produced transformer in the `afterDeclarations` bucket.
    #[serde(default)]
    pub after_declarations: bool,

    /// Treat the export as a whole-program transformer chain link.
    /// Placement flags and `type` are ignored when set.
    #[serde(default)]
    pub transform_program: bool,

    /// Resolve the plugin's own imports through its path-alias map.
    #[serde(default)]
    pub resolve_path_aliases: bool,

    /// Project configuration file supplying the alias map.
    #[serde(default)]
    pub ts_config: Option<String>,

    /// Whether the plugin module is authored as an ES module.
    #[serde(default)]
    pub is_esm: bool,

    /// Remaining fields pass through verbatim to the plugin as its config.
    #[serde(flatten)]
    pub options: serde_json::Map<String, Value>,
}

impl PluginConfig {
    /// Name used in error messages: explicit `name`, else the module
    /// specifier, else a placeholder.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.transform.as_deref())
            .unwrap_or("<unnamed plugin>")
    }

    /// Effective dispatch pattern for this descriptor.
    pub fn dispatch_type(&self) -> PluginType {
        self.plugin_type.unwrap_or_default()
    }

    /// User options passed through to the plugin.
    pub fn options_value(&self) -> Value {
        Value::Object(self.options.clone())
    }
}

/// Host compiler options the orchestration subsystems consume.
///
/// This is deliberately a subset: only the fields that influence plugin
/// dispatch and output-path rewriting are modeled.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    /// Output directory for emitted files.
    #[serde(default)]
    pub out_dir: Option<String>,

    /// Common source directory all inputs are resolved against.
    #[serde(default)]
    pub root_dir: Option<String>,

    /// Logical source roots merged into one output tree.
    #[serde(default)]
    pub root_dirs: Option<Vec<String>>,

    /// Emit declaration files.
    #[serde(default)]
    pub declaration: bool,

    /// Emit source maps.
    #[serde(default)]
    pub source_map: bool,

    /// Type check only, emit nothing.
    #[serde(default)]
    pub no_emit: bool,
}

/// Project-level configuration: host compiler options plus the ordered
/// plugin descriptor list.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub compiler_options: CompilerOptions,

    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl ProjectConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ProjectConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_config_deserialization() {
        let json = r#"{
            "transform": "./transformers/keys.ts",
            "type": "program",
            "after": true,
            "someOption": 42
        }"#;
        let config: PluginConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.transform.as_deref(), Some("./transformers/keys.ts"));
        assert_eq!(config.dispatch_type(), PluginType::Program);
        assert!(config.after);
        assert!(!config.after_declarations);
        assert_eq!(config.options.get("someOption"), Some(&Value::from(42)));
    }

    #[test]
    fn test_plugin_type_defaults_to_program() {
        let json = r#"{ "transform": "my-transformer" }"#;
        let config: PluginConfig = serde_json::from_str(json).unwrap();

        assert!(config.plugin_type.is_none());
        assert_eq!(config.dispatch_type(), PluginType::Program);
    }

    #[test]
    fn test_compiler_options_discriminant_spelling() {
        let json = r#"{ "transform": "t", "type": "compilerOptions" }"#;
        let config: PluginConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.dispatch_type(), PluginType::CompilerOptions);
    }

    #[test]
    fn test_display_name_fallback() {
        let mut config = PluginConfig::default();
        assert_eq!(config.display_name(), "<unnamed plugin>");

        config.transform = Some("./t1".to_string());
        assert_eq!(config.display_name(), "./t1");

        config.name = Some("keys".to_string());
        assert_eq!(config.display_name(), "keys");
    }

    #[test]
    fn test_project_config_plugin_order_preserved() {
        let json = r#"{
            "compilerOptions": { "outDir": "dist" },
            "plugins": [
                { "transform": "./a" },
                { "transform": "./b" },
                { "transform": "./c" }
            ]
        }"#;
        let config: ProjectConfig = serde_json::from_str(json).unwrap();

        let order: Vec<_> = config
            .plugins
            .iter()
            .map(|p| p.transform.as_deref().unwrap())
            .collect();
        assert_eq!(order, ["./a", "./b", "./c"]);
        assert_eq!(config.compiler_options.out_dir.as_deref(), Some("dist"));
    }
}
