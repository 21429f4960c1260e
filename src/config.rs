use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub inspect: InspectConfig,

    /// Pattern sets by category; automatons are built from the flattened
    /// list in category order.
    #[serde(default = "default_pattern_sets")]
    pub patterns: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            inspect: InspectConfig::default(),
            patterns: default_pattern_sets(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/pktwarden/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("pktwarden/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("config.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// All configured patterns, flattened in category order.
    pub fn flat_patterns(&self) -> Vec<String> {
        self.patterns.values().flatten().cloned().collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectConfig {
    /// Maximum payload bytes handed to the engines per scan
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Include the per-byte step trace in scan reports
    #[serde(default = "default_true")]
    pub step_trace: bool,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            step_trace: true,
        }
    }
}

/// Built-in signature categories.
fn default_pattern_sets() -> BTreeMap<String, Vec<String>> {
    let mut sets = BTreeMap::new();

    sets.insert(
        "malware".to_string(),
        ["virus", "malware", "exploit", "ransom"]
            .map(String::from)
            .to_vec(),
    );

    sets.insert(
        "web_injection".to_string(),
        ["<script", "</script", "<iframe", "base64", "eval"]
            .map(String::from)
            .to_vec(),
    );

    sets.insert(
        "sql_injection".to_string(),
        ["' OR 1", "UNION SELECT", "DROP TABLE"]
            .map(String::from)
            .to_vec(),
    );

    sets.insert(
        "command_injection".to_string(),
        [";r", "&&w", "|b"].map(String::from).to_vec(),
    );

    sets.insert(
        "credential_phish".to_string(),
        ["login", "verify", "password", "account"]
            .map(String::from)
            .to_vec(),
    );

    sets
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_payload_bytes() -> usize {
    65536
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.patterns.contains_key("sql_injection"));
        assert_eq!(config.inspect.max_payload_bytes, 65536);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.patterns, config.patterns);
        assert_eq!(
            parsed.inspect.max_payload_bytes,
            config.inspect.max_payload_bytes
        );
    }

    #[test]
    fn test_flat_patterns_follow_category_order() {
        let config = Config::default();
        let flat = config.flat_patterns();
        assert_eq!(
            flat.len(),
            config.patterns.values().map(|v| v.len()).sum::<usize>()
        );
        // BTreeMap iterates categories in name order.
        let first_category = config.patterns.keys().next().unwrap();
        assert_eq!(flat[0], config.patterns[first_category][0]);
    }

    #[test]
    fn test_partial_config_parses() {
        let parsed: Config = toml::from_str("[general]\nlog_level = \"debug\"\n").unwrap();
        assert_eq!(parsed.general.log_level, "debug");
        // Unspecified sections fall back to defaults.
        assert!(!parsed.patterns.is_empty());
    }
}
