use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::OutputPolicy;

/// Required length of the remote service API key.
pub const API_KEY_LEN: usize = 32;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn default_api_url() -> String {
    "https://api.urlquery.net".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    60
}

fn default_tail_interval_ms() -> u64 {
    250
}

fn default_poll_interval_secs() -> u64 {
    4
}

fn default_access() -> String {
    "public".to_string()
}

// ── Top-level config ──────────────────────────────────────────

/// Application config, built once at startup and handed to each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(rename = "apikey", default)]
    pub api_key: String,

    /// Base URL of the analysis service.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Upper bound for draining the webhook listener on shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// How often watched files are checked for new lines.
    #[serde(default = "default_tail_interval_ms")]
    pub tail_interval_ms: u64,

    #[serde(default)]
    pub poll: PollSettings,

    #[serde(default)]
    pub webhooks: WebhookSettings,

    #[serde(default)]
    pub submit: Vec<SubmitterSettings>,
}

impl AppConfig {
    /// Parse config from a YAML string, apply env overrides and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Apply environment variable overrides.
    ///
    /// - `UQW_APIKEY` -> `apikey`
    /// - `UQW_API_URL` -> `api_url`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_opt("UQW_APIKEY") {
            self.api_key = v;
        }
        if let Some(v) = env_opt("UQW_API_URL") {
            self.api_url = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let key_len = self.api_key.chars().count();
        if key_len != API_KEY_LEN {
            return Err(ConfigError::ApiKey(key_len));
        }

        if self.webhooks.enabled && self.webhooks.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "webhooks are enabled but no listen address is set".into(),
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Validation("poll.interval_secs must be > 0".into()));
        }

        if self.poll.max_attempts == Some(0) {
            return Err(ConfigError::Validation(
                "poll.max_attempts must be > 0 (omit it for no limit)".into(),
            ));
        }

        if self.poll.max_duration_secs == Some(0) {
            return Err(ConfigError::Validation(
                "poll.max_duration_secs must be > 0 (omit it for no limit)".into(),
            ));
        }

        if self.tail_interval_ms == 0 {
            return Err(ConfigError::Validation("tail_interval_ms must be > 0".into()));
        }

        for (idx, source) in self.submit.iter().enumerate() {
            if source.enabled && source.file.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "submit[{idx}] is enabled but has no file"
                )));
            }
        }

        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn tail_interval(&self) -> Duration {
        Duration::from_millis(self.tail_interval_ms)
    }

    /// Sources that get an ingestion worker.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SubmitterSettings> {
        self.submit.iter().filter(|s| s.enabled)
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  api:       url={}", self.api_url);
        tracing::info!(
            "  webhooks:  enabled={}, listen={}, secret={}",
            self.webhooks.enabled,
            self.webhooks.listen,
            if self.webhooks.secret.is_some() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  poll:      interval={}s, max_attempts={:?}, max_duration={:?}s",
            self.poll.interval_secs,
            self.poll.max_attempts,
            self.poll.max_duration_secs
        );
        for source in &self.submit {
            tracing::info!(
                "  submit:    file={}, enabled={}, output={}",
                source.file.display(),
                source.enabled,
                if source.output.enabled { source.output.path.as_str() } else { "(disabled)" }
            );
        }
    }
}

// ── Polling ───────────────────────────────────────────────────

/// Cadence and bounds for completion polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    /// Give up after this many status queries (unbounded when unset).
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Give up after this much time (unbounded when unset).
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            max_attempts: None,
            max_duration_secs: None,
        }
    }
}

// ── Webhooks ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub listen: String,
    /// Shared secret inbound requests must present. No check when unset.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub reports: WebhookReports,
}

/// Output policy per pushed event kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookReports {
    #[serde(default)]
    pub alerted: OutputPolicy,
    /// Used for `completed` events.
    #[serde(default)]
    pub submitted: OutputPolicy,
}

// ── Submission sources ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitterSettings {
    /// Watched file, one URL per line.
    pub file: PathBuf,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub settings: SubmissionParams,
    #[serde(default)]
    pub output: OutputPolicy,
}

/// Parameters sent along with every URL from a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionParams {
    #[serde(default = "default_access")]
    pub access: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Default for SubmissionParams {
    fn default() -> Self {
        Self {
            access: default_access(),
            tags: Vec::new(),
            meta: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn full_yaml(key: &str) -> String {
        format!(
            r#"
apikey: "{key}"
webhooks:
  enabled: true
  listen: "127.0.0.1:8080"
  reports:
    alerted:
      enabled: true
      path: out/alerted
      report: true
      screenshot: true
    submitted:
      enabled: true
      path: /var/uqw/submitted/
      report: true
submit:
  - file: urls.txt
    enabled: true
    settings:
      access: private
      tags: [feed, phishing]
      meta:
        origin: crawler
    output:
      enabled: true
      path: out
      report: true
      screenshot: false
      domain_graph: true
  - file: other.txt
    enabled: false
"#
        )
    }

    #[test]
    fn parse_full_yaml() {
        let cfg = AppConfig::from_yaml(&full_yaml(KEY)).unwrap();
        assert_eq!(cfg.api_key, KEY);
        assert!(cfg.webhooks.enabled);
        assert_eq!(cfg.webhooks.listen, "127.0.0.1:8080");
        assert!(cfg.webhooks.reports.alerted.screenshot);
        assert!(!cfg.webhooks.reports.alerted.domain_graph);
        assert_eq!(cfg.webhooks.reports.submitted.path, "/var/uqw/submitted/");
        assert_eq!(cfg.submit.len(), 2);

        let first = &cfg.submit[0];
        assert_eq!(first.file, PathBuf::from("urls.txt"));
        assert_eq!(first.settings.access, "private");
        assert_eq!(first.settings.tags, vec!["feed", "phishing"]);
        assert_eq!(first.settings.meta["origin"], "crawler");
        assert!(first.output.domain_graph);

        assert_eq!(cfg.enabled_sources().count(), 1);
    }

    #[test]
    fn defaults_apply() {
        let cfg = AppConfig::from_yaml(&format!("apikey: \"{KEY}\"\n")).unwrap();
        assert_eq!(cfg.api_url, "https://api.urlquery.net");
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.poll.interval(), Duration::from_secs(4));
        assert_eq!(cfg.poll.max_attempts, None);
        assert_eq!(cfg.tail_interval(), Duration::from_millis(250));
        assert!(!cfg.webhooks.enabled);
        assert!(cfg.submit.is_empty());
    }

    #[test]
    fn api_key_of_31_chars_is_rejected() {
        let short = &KEY[..31];
        match AppConfig::from_yaml(&full_yaml(short)) {
            Err(ConfigError::ApiKey(31)) => {}
            other => panic!("expected ApiKey error, got: {other:?}"),
        }
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let result = AppConfig::from_yaml("submit: []\n");
        assert!(matches!(result, Err(ConfigError::ApiKey(0))));
    }

    #[test]
    fn webhook_without_listen_is_rejected() {
        let yaml = format!("apikey: \"{KEY}\"\nwebhooks:\n  enabled: true\n");
        let result = AppConfig::from_yaml(&yaml);
        match result {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains("listen")),
            other => panic!("expected Validation error, got: {other:?}"),
        }
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let yaml = format!("apikey: \"{KEY}\"\npoll:\n  interval_secs: 0\n");
        assert!(matches!(
            AppConfig::from_yaml(&yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn zero_poll_bounds_are_rejected() {
        for bound in ["max_attempts: 0", "max_duration_secs: 0"] {
            let yaml = format!("apikey: \"{KEY}\"\npoll:\n  {bound}\n");
            match AppConfig::from_yaml(&yaml) {
                Err(ConfigError::Validation(msg)) => assert!(msg.contains("must be > 0"), "{msg}"),
                other => panic!("expected Validation error for {bound}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn poll_bounds_parse() {
        let yaml = format!(
            "apikey: \"{KEY}\"\npoll:\n  interval_secs: 2\n  max_attempts: 10\n  max_duration_secs: 120\n"
        );
        let cfg = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(cfg.poll.interval(), Duration::from_secs(2));
        assert_eq!(cfg.poll.max_attempts, Some(10));
        assert_eq!(cfg.poll.max_duration(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let result = AppConfig::from_yaml("apikey: [unclosed");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn from_file_missing() {
        let result = AppConfig::from_file("/definitely/not/here/uqw.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn from_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uqw.yaml");
        std::fs::write(&path, full_yaml(KEY)).unwrap();
        let cfg = AppConfig::from_file(&path).unwrap();
        assert_eq!(cfg.submit.len(), 2);
    }
}
