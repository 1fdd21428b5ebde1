use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleStateError};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_sweep_interval_secs() -> u64 {
    600
}

fn default_hit_buffer_secs() -> u64 {
    45 * 60
}

// ── Rule-state config ─────────────────────────────────────────

/// Settings for the rule-state caches and their maintenance task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStateConfig {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,

    /// Seconds between maintenance sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// How long a processed hit id is remembered for de-duplication.
    #[serde(default = "default_hit_buffer_secs")]
    pub hit_buffer_secs: u64,

    /// Upper bound on pages fetched per paginated query. `None` = until exhausted.
    #[serde(default)]
    pub max_pages: Option<u32>,
}

impl Default for RuleStateConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            sweep_interval_secs: default_sweep_interval_secs(),
            hit_buffer_secs: default_hit_buffer_secs(),
            max_pages: None,
        }
    }
}

impl RuleStateConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `ALERTWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("ALERTWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            sweep_interval_secs: profiled_env_u64(
                p,
                "ALERTWATCH_SWEEP_INTERVAL_SECS",
                default_sweep_interval_secs(),
            ),
            hit_buffer_secs: profiled_env_u64(
                p,
                "ALERTWATCH_HIT_BUFFER_SECS",
                default_hit_buffer_secs(),
            ),
            max_pages: profiled_env_opt(p, "ALERTWATCH_MAX_PAGES").and_then(|v| v.parse().ok()),
        }
    }

    /// Parse config from a TOML string and validate it.
    pub fn from_toml(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(RuleStateError::Config(
                "sweep_interval_secs must be > 0".to_string(),
            ));
        }
        if self.max_pages == Some(0) {
            return Err(RuleStateError::Config("max_pages must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn hit_buffer(&self) -> Duration {
        Duration::from_secs(self.hit_buffer_secs)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Rule-state config loaded (profile: {}):", self.profile_label());
        tracing::info!("  sweep:       interval={}s", self.sweep_interval_secs);
        tracing::info!("  hits:        buffer={}s", self.hit_buffer_secs);
        match self.max_pages {
            Some(n) => tracing::info!("  pagination:  max_pages={}", n),
            None => tracing::info!("  pagination:  max_pages=(unlimited)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RuleStateConfig::default();
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(600));
        assert_eq!(cfg.hit_buffer(), Duration::from_secs(2700));
        assert_eq!(cfg.max_pages, None);
        assert_eq!(cfg.profile_label(), "default");
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let cfg = RuleStateConfig::from_toml("max_pages = 5\n").unwrap();
        assert_eq!(cfg.max_pages, Some(5));
        assert_eq!(cfg.sweep_interval_secs, 600);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = RuleStateConfig::from_toml("sweep_interval_secs = 0\n").unwrap_err();
        assert!(matches!(err, RuleStateError::Config(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = RuleStateConfig::from_toml("sweep_interval_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, RuleStateError::ConfigParse(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sweep_interval_secs = 30\nhit_buffer_secs = 90").unwrap();

        let cfg = RuleStateConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.sweep_interval(), Duration::from_secs(30));
        assert_eq!(cfg.hit_buffer(), Duration::from_secs(90));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RuleStateConfig::from_file("/nonexistent/alertwatch.toml").unwrap_err();
        assert!(matches!(err, RuleStateError::Io(_)));
    }

    #[test]
    fn profiled_env_overrides_default_key() {
        env::set_var("CFGTEST_ALERTWATCH_SWEEP_INTERVAL_SECS", "42");
        env::set_var("CFGTEST_ALERTWATCH_MAX_PAGES", "3");

        let cfg = RuleStateConfig::for_profile("cfgtest");
        assert_eq!(cfg.profile, "CFGTEST");
        assert_eq!(cfg.sweep_interval_secs, 42);
        assert_eq!(cfg.max_pages, Some(3));

        env::remove_var("CFGTEST_ALERTWATCH_SWEEP_INTERVAL_SECS");
        env::remove_var("CFGTEST_ALERTWATCH_MAX_PAGES");
    }
}
