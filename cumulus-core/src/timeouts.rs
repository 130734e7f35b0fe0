//! Per-verb timeouts and the duration syntax used to configure them

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LifecycleError;

pub const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
pub const TWENTY_MINUTES: Duration = Duration::from_secs(20 * 60);
pub const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);

/// Timeout applied to any verb that does not override it
pub const DEFAULT_TIMEOUT: Duration = TWENTY_MINUTES;

/// The four lifecycle verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
}

impl Verb {
    /// Noun form used in user facing messages ("creation failed")
    pub fn operation_name(&self) -> &'static str {
        match self {
            Verb::Create => "creation",
            Verb::Read => "read",
            Verb::Update => "update",
            Verb::Delete => "deletion",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Create => write!(f, "create"),
            Verb::Read => write!(f, "read"),
            Verb::Update => write!(f, "update"),
            Verb::Delete => write!(f, "delete"),
        }
    }
}

/// Independently configurable timeout for each verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTimeouts {
    #[serde(with = "duration_str", default = "default_timeout")]
    pub create: Duration,
    #[serde(with = "duration_str", default = "default_timeout")]
    pub read: Duration,
    #[serde(with = "duration_str", default = "default_timeout")]
    pub update: Duration,
    #[serde(with = "duration_str", default = "default_timeout")]
    pub delete: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for ResourceTimeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

impl ResourceTimeouts {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    pub fn get(&self, verb: Verb) -> Duration {
        match verb {
            Verb::Create => self.create,
            Verb::Read => self.read,
            Verb::Update => self.update,
            Verb::Delete => self.delete,
        }
    }

    pub fn with(mut self, verb: Verb, timeout: Duration) -> Self {
        match verb {
            Verb::Create => self.create = timeout,
            Verb::Read => self.read = timeout,
            Verb::Update => self.update = timeout,
            Verb::Delete => self.delete = timeout,
        }
        self
    }
}

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").expect("duration pattern is valid")
});

/// Parse a duration such as `"20m"`, `"1h30m"` or `"45s"`
pub fn parse_duration(s: &str) -> Result<Duration, LifecycleError> {
    let trimmed = s.trim();
    let invalid = || LifecycleError::config(format!("invalid duration '{}'", s));

    if trimmed.is_empty() {
        return Err(invalid());
    }
    let caps = DURATION_RE.captures(trimmed).ok_or_else(invalid)?;

    let mut secs = 0u64;
    for (index, unit) in [(1, 3600u64), (2, 60), (3, 1)] {
        if let Some(m) = caps.get(index) {
            let n: u64 = m.as_str().parse().map_err(|_| invalid())?;
            secs = secs.checked_add(n.saturating_mul(unit)).ok_or_else(invalid)?;
        }
    }
    Ok(Duration::from_secs(secs))
}

/// Render a duration in the same syntax `parse_duration` accepts
pub fn format_duration(d: &Duration) -> String {
    let total = d.as_secs();
    if total == 0 {
        return if d.is_zero() {
            "0s".to_string()
        } else {
            format!("{}ms", d.as_millis())
        };
    }
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::new();
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 {
        out.push_str(&format!("{}s", s));
    }
    out
}

/// Serde adapter storing a `Duration` as a duration string
pub mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for an optional duration string
pub mod opt_duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&format_duration(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
