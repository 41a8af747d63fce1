//! Counter collection configuration

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Which events to collect and how.
///
/// Loaded from TOML; any field left out falls back to the environment
/// (`APERTURE_GPU_EVENTS`, `APERTURE_GPU_PER_INSTANCE`,
/// `APERTURE_GPU_CONTINUOUS`) and then to built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Event names, resolved against the bound device
    pub events: Vec<String>,

    /// Read one value per hardware instance instead of a device total
    pub per_instance: bool,

    /// Switch the device context to continuous collection before creating
    /// group sets
    pub continuous_mode: bool,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl CounterConfig {
    /// Build defaults from a variable lookup (the process environment for
    /// [`Default`]).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let events: Vec<String> = lookup("APERTURE_GPU_EVENTS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            events,
            per_instance: lookup("APERTURE_GPU_PER_INSTANCE")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
            continuous_mode: lookup("APERTURE_GPU_CONTINUOUS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse counter config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read counter config {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.events.is_empty() {
            anyhow::bail!("At least one event name is required");
        }

        let mut seen = HashSet::new();
        for name in &self.events {
            if name.trim().is_empty() {
                anyhow::bail!("Event names must not be empty");
            }
            if !seen.insert(name.as_str()) {
                anyhow::bail!("Event {} listed more than once", name);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = CounterConfig::from_lookup(lookup(&[]));
        assert!(config.events.is_empty());
        assert!(!config.per_instance);
        assert!(config.continuous_mode);
    }

    #[test]
    fn test_environment_overrides() {
        let config = CounterConfig::from_lookup(lookup(&[
            ("APERTURE_GPU_EVENTS", "active_cycles, inst_executed,,"),
            ("APERTURE_GPU_PER_INSTANCE", "yes"),
            ("APERTURE_GPU_CONTINUOUS", "0"),
        ]));
        assert_eq!(config.events, vec!["active_cycles", "inst_executed"]);
        assert!(config.per_instance);
        assert!(!config.continuous_mode);
    }

    #[test]
    fn test_unparseable_flag_keeps_default() {
        let config =
            CounterConfig::from_lookup(lookup(&[("APERTURE_GPU_CONTINUOUS", "sometimes")]));
        assert!(config.continuous_mode);
    }

    #[test]
    fn test_parse_toml() {
        let config = CounterConfig::from_toml_str(
            r#"
            events = ["active_cycles", "inst_executed"]
            per_instance = true
            continuous_mode = false
            "#,
        )
        .unwrap();

        assert_eq!(config.events.len(), 2);
        assert!(config.per_instance);
        assert!(!config.continuous_mode);
    }

    #[test]
    fn test_validation() {
        assert!(CounterConfig::from_toml_str("events = []").is_err());
        assert!(CounterConfig::from_toml_str(r#"events = ["a", "a"]"#).is_err());
        assert!(CounterConfig::from_toml_str(r#"events = [" "]"#).is_err());
        assert!(CounterConfig::from_toml_str("events = 3").is_err());
    }
}
