//! Configuration management for `logmesh.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   └── net        # [net]
//! ├── types/         # Utility types
//! │   ├── error      # ConfigError, ConfigDiagnostics
//! │   └── field      # FieldPath
//! └── mod.rs         # Config (this file)
//! ```
//!
//! # Example
//!
//! ```toml
//! version = "0.1"
//!
//! [net]
//! interval_ms = 100
//!
//! [[rules]]
//! filter = { include = "ERROR" }
//! format = { line = "red", match = "bold bright red" }
//! ```
//!
//! The file is optional; a missing file means defaults everywhere.

pub mod section;
pub mod types;

pub use section::NetConfig;
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::{
    log,
    rules::{Rule, RuleConfig, RuleError, Rules},
};
use anyhow::Result;
use serde::Deserialize;
use std::{
    error::Error as _,
    fs,
    path::{Path, PathBuf},
};

/// Config file versions this build understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.1"];

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing logmesh.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path the config was loaded from (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// File format version; omitted means current.
    pub version: Option<String>,

    /// Socket tunables
    pub net: NetConfig,

    /// Listener filter / colorize rules, applied in order
    pub rules: Vec<RuleConfig>,
}

impl Config {
    /// Load and validate `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.is_file() {
            Self::from_path(path)?
        } else {
            crate::debug!("config"; "{} not found, using defaults", path.display());
            Self::default()
        };
        config.config_path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Compile `[[rules]]` into a ready-to-use rule set.
    pub fn compile_rules(&self) -> Result<Rules, RuleError> {
        Rules::compile(&self.rules)
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Collect every validation error and return them at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        if let Some(version) = &self.version
            && !SUPPORTED_VERSIONS.contains(&version.as_str())
        {
            diag.error_with_hint(
                FieldPath::new("version"),
                format!("unsupported config version `{version}`"),
                format!("supported: {}", SUPPORTED_VERSIONS.join(", ")),
            );
        }

        self.net.validate(&mut diag);
        if self.net.interval_ms > 10_000 {
            diag.warn(
                FieldPath::new("net.interval_ms"),
                "Ctrl+C may take this long to take effect",
            );
        }

        for (i, rule) in self.rules.iter().enumerate() {
            Self::validate_rule(i, rule, &mut diag);
        }

        diag.print_warnings();
        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }

    fn validate_rule(index: usize, rule: &RuleConfig, diag: &mut ConfigDiagnostics) {
        let Err(err) = Rule::compile(rule) else {
            return;
        };
        match &err {
            RuleError::Pattern { .. } => {
                let message = match err.source() {
                    Some(source) => format!("{err}: {source}"),
                    None => err.to_string(),
                };
                diag.error(FieldPath::indexed("rules", index, "filter"), message);
            }
            RuleError::Style(_) => diag.error_with_hint(
                FieldPath::indexed("rules", index, "format"),
                err.to_string(),
                "use color names (red, bright blue), effects (bold, underline) or `on <color>`",
            ),
        }
    }
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn diagnostics(config: &Config) -> Vec<String> {
        let err = config.validate().unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::Diagnostics(diag)) => diag
                .errors()
                .iter()
                .map(|e| e.field.as_str().to_string())
                .collect(),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.net, NetConfig::default());
        assert!(config.rules.is_empty());
        assert!(config.version.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(Config::from_str("[net\nhwm = 1").is_err());
    }

    #[test]
    fn test_net_section() {
        let config = Config::from_str("[net]\ninterval_ms = 20\nhwm = 5").unwrap();
        let options = config.net.to_options();
        assert_eq!(options.poll_interval, Duration::from_millis(20));
        assert_eq!(options.hwm, 5);
        assert_eq!(options.reconnect_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_rules_section() {
        let config = Config::from_str(
            r#"
            version = "0.1"

            [[rules]]
            filter = { include = "ERROR" }

            [[rules]]
            format = { line = "red" }
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.compile_rules().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = "[net]\nhwm = 3\nbogus = 1\n[unknown_section]\nfield = \"value\"";
        let (config, ignored) = Config::parse_with_ignored(content).unwrap();
        assert_eq!(config.net.hwm, 3);
        assert!(ignored.iter().any(|f| f.contains("bogus")));
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_no_unknown_fields() {
        let (_, ignored) =
            Config::parse_with_ignored("[net]\nhwm = 3\n[[rules]]\nformat = { match = \"red\" }")
                .unwrap();
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_validation_collects_every_error() {
        let config = Config::from_str(
            r#"
            version = "9"

            [net]
            hwm = 0

            [[rules]]
            format = { line = "red" }

            [[rules]]
            filter = { include = "(unclosed" }

            [[rules]]
            format = { match = "sparkly" }
            "#,
        )
        .unwrap();
        assert_eq!(
            diagnostics(&config),
            ["version", "net.hwm", "rules[1].filter", "rules[2].format"]
        );
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmesh.toml");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.config_path, path);
        assert_eq!(config.net, NetConfig::default());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmesh.toml");
        fs::write(&path, "[net]\nreconnect_ms = 50\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.net.reconnect_ms, 50);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmesh.toml");
        fs::write(&path, "[[rules]]\nfilter = { exclude = \"[\" }\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
