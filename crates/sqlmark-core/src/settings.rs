use crate::probe::ProbeRunner;
use std::env;
use std::time::Duration;

pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 10_000;

/// Runtime settings taken from the environment; CLI flags override them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Database candidates are graded against.
    pub database_url: Option<String>,
    /// Author reference database; falls back to `database_url`.
    pub author_database_url: Option<String>,
    /// Budget for one probe scope. 0 disables the timeout.
    pub probe_timeout_ms: u64,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            author_database_url: None,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("SQLMARK_DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            cfg.database_url = Some(v);
        }
        if let Some(v) = lookup("SQLMARK_AUTHOR_DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            cfg.author_database_url = Some(v);
        }
        if let Some(v) = lookup("SQLMARK_PROBE_TIMEOUT_MS") {
            match v.trim().parse() {
                Ok(n) => cfg.probe_timeout_ms = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid SQLMARK_PROBE_TIMEOUT_MS"),
            }
        }
        if let Some(v) = lookup("SQLMARK_LOG") {
            cfg.log_level = v;
        }
        cfg
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        (self.probe_timeout_ms > 0).then(|| Duration::from_millis(self.probe_timeout_ms))
    }

    pub fn probe_runner(&self) -> ProbeRunner {
        ProbeRunner::new(self.probe_timeout())
    }

    pub fn author_url(&self) -> Option<&str> {
        self.author_database_url
            .as_deref()
            .or(self.database_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let s = settings(&[]);
        assert_eq!(s, Settings::default());
        assert_eq!(s.probe_timeout(), Some(Duration::from_millis(10_000)));
        assert_eq!(s.author_url(), None);
    }

    #[test]
    fn zero_timeout_disables_it() {
        let s = settings(&[("SQLMARK_PROBE_TIMEOUT_MS", "0")]);
        assert_eq!(s.probe_timeout(), None);
    }

    #[test]
    fn author_url_falls_back_to_grading_url() {
        let s = settings(&[("SQLMARK_DATABASE_URL", "sqlite::memory:")]);
        assert_eq!(s.author_url(), Some("sqlite::memory:"));
        let s = settings(&[
            ("SQLMARK_DATABASE_URL", "sqlite::memory:"),
            ("SQLMARK_AUTHOR_DATABASE_URL", "sqlite://author.db"),
        ]);
        assert_eq!(s.author_url(), Some("sqlite://author.db"));
    }

    #[test]
    fn invalid_timeout_keeps_default() {
        let s = settings(&[("SQLMARK_PROBE_TIMEOUT_MS", "soon")]);
        assert_eq!(s.probe_timeout_ms, DEFAULT_PROBE_TIMEOUT_MS);
    }
}
