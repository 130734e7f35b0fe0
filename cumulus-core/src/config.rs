//! Provider configuration
//!
//! Loaded from a JSON file, then overridden from the environment.
//!
//! ```json
//! {
//!   "region": "sim-phoenix-1",
//!   "timeouts": { "create": "20m", "delete": "1h30m" },
//!   "poll_interval": "5s",
//!   "extra_wait_post_delete": "30s"
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, LifecycleResult};
use crate::lifecycle::Capabilities;
use crate::timeouts::{ResourceTimeouts, opt_duration_str};

pub const DEFAULT_REGION: &str = "sim-phoenix-1";
pub const REGION_ENV: &str = "CUMULUS_REGION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Timeouts for resources that do not set their own
    #[serde(default)]
    pub timeouts: ResourceTimeouts,
    #[serde(default, with = "opt_duration_str", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<Duration>,
    #[serde(default, with = "opt_duration_str", skip_serializing_if = "Option::is_none")]
    pub extra_wait_post_create_delete: Option<Duration>,
    #[serde(default, with = "opt_duration_str", skip_serializing_if = "Option::is_none")]
    pub extra_wait_post_delete: Option<Duration>,
    /// Log an operation metric for every lifecycle call
    #[serde(default)]
    pub metrics: bool,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            timeouts: ResourceTimeouts::default(),
            poll_interval: None,
            extra_wait_post_create_delete: None,
            extra_wait_post_delete: None,
            metrics: false,
        }
    }
}

impl ProviderConfig {
    pub fn from_json(json: &str) -> LifecycleResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| LifecycleError::config(format!("failed to parse provider config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> LifecycleResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LifecycleError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Load `path` if given, otherwise the defaults; then apply the environment
    pub fn resolve(path: Option<&Path>) -> LifecycleResult<Self> {
        let config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        Ok(config.with_env())
    }

    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(region) = lookup(REGION_ENV).filter(|r| !r.trim().is_empty()) {
            log::debug!("region overridden from {}: {}", REGION_ENV, region);
            self.region = region.trim().to_string();
        }
        self
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        if self.region.trim().is_empty() {
            return Err(LifecycleError::config("region must not be empty"));
        }
        let t = &self.timeouts;
        if [t.create, t.read, t.update, t.delete].iter().any(Duration::is_zero) {
            return Err(LifecycleError::config("timeouts must be greater than zero"));
        }
        Ok(())
    }

    /// Fill in tuning the adapter left undeclared
    pub fn apply_to(&self, mut caps: Capabilities) -> Capabilities {
        if caps.poll_interval.is_none() {
            caps.poll_interval = self.poll_interval;
        }
        if caps.extra_wait_post_create_delete.is_none() {
            caps.extra_wait_post_create_delete = self.extra_wait_post_create_delete;
        }
        if caps.extra_wait_post_delete.is_none() {
            caps.extra_wait_post_delete = self.extra_wait_post_delete;
        }
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeouts::{TWENTY_MINUTES, Verb};
    use std::io::Write;

    #[test]
    fn defaults_when_fields_missing() {
        let config = ProviderConfig::from_json("{}").unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.timeouts.get(Verb::Read), TWENTY_MINUTES);
    }

    #[test]
    fn parses_duration_strings() {
        let config = ProviderConfig::from_json(
            r#"{
                "region": "sim-ashburn-1",
                "timeouts": { "create": "45m", "delete": "1h30m" },
                "poll_interval": "5s",
                "extra_wait_post_delete": "30s"
            }"#,
        )
        .unwrap();

        assert_eq!(config.region, "sim-ashburn-1");
        assert_eq!(config.timeouts.create, Duration::from_secs(45 * 60));
        assert_eq!(config.timeouts.delete, Duration::from_secs(90 * 60));
        assert_eq!(config.timeouts.update, TWENTY_MINUTES);
        assert_eq!(config.poll_interval, Some(Duration::from_secs(5)));
        assert_eq!(config.extra_wait_post_delete, Some(Duration::from_secs(30)));
    }

    #[test]
    fn rejects_bad_durations_and_empty_region() {
        assert!(ProviderConfig::from_json(r#"{"poll_interval": "soon"}"#).is_err());
        assert!(ProviderConfig::from_json(r#"{"region": " "}"#).is_err());
        assert!(ProviderConfig::from_json(r#"{"timeouts": {"create": "0s"}}"#).is_err());
    }

    #[test]
    fn environment_overrides_region() {
        let config = ProviderConfig::default().with_env_from(|key| {
            (key == REGION_ENV).then(|| "sim-frankfurt-1".to_string())
        });
        assert_eq!(config.region, "sim-frankfurt-1");

        let config = ProviderConfig::default().with_env_from(|_| Some(String::new()));
        assert_eq!(config.region, DEFAULT_REGION);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"region": "sim-tokyo-1", "metrics": true}}"#).unwrap();

        let config = ProviderConfig::load(file.path()).unwrap();
        assert_eq!(config.region, "sim-tokyo-1");
        assert!(config.metrics);

        let missing = file.path().with_extension("missing");
        assert!(ProviderConfig::load(&missing).is_err());
    }

    #[test]
    fn apply_to_keeps_adapter_declarations() {
        let config = ProviderConfig {
            poll_interval: Some(Duration::from_secs(2)),
            extra_wait_post_delete: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let caps = Capabilities::new().poll_interval(Duration::from_secs(10));

        let caps = config.apply_to(caps);
        assert_eq!(caps.poll_interval, Some(Duration::from_secs(10)));
        assert_eq!(caps.extra_wait_post_delete, Some(Duration::from_secs(60)));
        assert_eq!(caps.extra_wait_post_create_delete, None);
    }
}
