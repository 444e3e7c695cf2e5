use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::namespace::NamespaceTable;

pub const DEFAULT_MAX_CATEGORY_COUNT: usize = 4;
pub const DEFAULT_MAX_RESULT_COUNT: usize = 500;
pub const DEFAULT_CACHE_PERIOD: u64 = 3600;
pub const DEFAULT_DEBUG_LEVEL: u8 = 2;
pub const MAX_FUNCTIONAL_RICHNESS: u8 = 4;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DplConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub dpl: DplSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    #[serde(default)]
    pub custom_namespaces: Vec<CustomNamespace>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomNamespace {
    pub name: String,
    pub id: i32,
    pub folder: Option<String>,
}

impl CustomNamespace {
    pub fn folder(&self) -> &str {
        self.folder.as_deref().unwrap_or(&self.name)
    }
}

/// Process-wide limits. Read-only for every directive invocation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct DplSection {
    pub min_category_count: usize,
    pub max_category_count: usize,
    pub allow_unlimited_categories: bool,
    pub allow_unlimited_results: bool,
    pub max_result_count: usize,
    pub run_from_protected_pages_only: bool,
    pub functional_richness: u8,
    pub debug_level: u8,
    pub default_cache_period: u64,
}

impl Default for DplSection {
    fn default() -> Self {
        Self {
            min_category_count: 0,
            max_category_count: DEFAULT_MAX_CATEGORY_COUNT,
            allow_unlimited_categories: false,
            allow_unlimited_results: false,
            max_result_count: DEFAULT_MAX_RESULT_COUNT,
            run_from_protected_pages_only: false,
            functional_richness: 3,
            debug_level: DEFAULT_DEBUG_LEVEL,
            default_cache_period: DEFAULT_CACHE_PERIOD,
        }
    }
}

impl DplConfig {
    /// Resolve the default diagnostic level: env DPL_DEBUG_LEVEL > config.
    pub fn debug_level(&self) -> u8 {
        self.debug_level_with_lookup(|key| env::var(key).ok())
    }

    /// Resolve the result cap: env DPL_MAX_RESULT_COUNT > config.
    pub fn max_result_count(&self) -> usize {
        self.max_result_count_with_lookup(|key| env::var(key).ok())
    }

    /// Limits with environment overrides applied.
    pub fn effective_limits(&self) -> DplSection {
        DplSection {
            max_result_count: self.max_result_count(),
            debug_level: self.debug_level(),
            functional_richness: self.functional_richness(),
            ..self.dpl.clone()
        }
    }

    pub fn functional_richness(&self) -> u8 {
        self.dpl.functional_richness.min(MAX_FUNCTIONAL_RICHNESS)
    }

    pub fn namespaces(&self) -> NamespaceTable {
        NamespaceTable::new(&self.wiki.custom_namespaces)
    }

    fn debug_level_with_lookup<F>(&self, lookup_env: F) -> u8
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup_env("DPL_DEBUG_LEVEL")
            .and_then(|value| value.trim().parse::<u8>().ok())
            .unwrap_or(self.dpl.debug_level)
    }

    fn max_result_count_with_lookup<F>(&self, lookup_env: F) -> usize
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup_env("DPL_MAX_RESULT_COUNT")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(self.dpl.max_result_count)
    }
}

/// Load and parse a DplConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<DplConfig> {
    if !config_path.exists() {
        return Ok(DplConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: DplConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}
