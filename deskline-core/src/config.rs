//! Configuration types
//!
//! Every section has defaults suitable for development. Deployments override
//! them from `DESKLINE_*` environment variables or a TOML file; both paths
//! end in [`DesklineConfig::validate`].

use crate::{ConfigError, DesklineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// SECTIONS
// ============================================================================

/// Transition engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Attempts per transition before a version conflict is surfaced
    pub max_conflict_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_attempts: 3,
        }
    }
}

/// Bounded exponential backoff for notification delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,
    /// Multiplier applied per further attempt
    pub factor: f64,
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Upper bound on any single delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_attempts: 5,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Notification dispatcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Capacity of the inbound queue
    pub queue_capacity: usize,
    /// Number of background delivery workers
    pub workers: usize,
    /// How long `enqueue` waits for room before reporting QueueFull
    #[serde(with = "duration_millis")]
    pub enqueue_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 4,
            enqueue_timeout: Duration::from_millis(50),
            retry: RetryPolicy::default(),
        }
    }
}

/// Auto-close job for Resolved tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoCloseConfig {
    pub enabled: bool,
    /// Resolved tickets untouched for longer than this are closed
    #[serde(with = "duration_millis")]
    pub resolved_ttl: Duration,
    #[serde(with = "duration_millis")]
    pub check_interval: Duration,
    /// Tickets closed per cycle at most
    pub batch_size: usize,
}

impl Default for AutoCloseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            resolved_ttl: Duration::from_secs(7 * 24 * 3600),
            check_interval: Duration::from_secs(300),
            batch_size: 100,
        }
    }
}

/// Classifier settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Tag required when no rule matches a ticket
    pub default_tag: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            default_tag: "general".to_string(),
        }
    }
}

/// Outbound webhook channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: String,
    /// HMAC-SHA256 signing secret
    pub secret: String,
    #[serde(with = "duration_millis", default = "default_webhook_timeout")]
    pub timeout: Duration,
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Outbound email channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    pub from: String,
    /// Always notified, in addition to the ticket requester
    #[serde(default)]
    pub watchers: Vec<String>,
}

/// Delivery channels; absent sections are disabled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelsConfig {
    pub webhook: Option<WebhookConfig>,
    pub email: Option<EmailConfig>,
}

/// HTTP server and durable-state locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// JSON-lines file for dead letters; in-memory when unset
    pub dead_letter_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            dead_letter_path: None,
        }
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DesklineConfig {
    pub engine: EngineConfig,
    pub dispatcher: DispatcherConfig,
    pub auto_close: AutoCloseConfig,
    pub classifier: ClassifierConfig,
    pub channels: ChannelsConfig,
    pub server: ServerConfig,
}

impl DesklineConfig {
    /// Load from a TOML file. Missing sections fall back to defaults.
    pub fn from_toml_path(path: &Path) -> DesklineResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse from TOML text and validate.
    pub fn from_toml_str(contents: &str) -> DesklineResult<Self> {
        let config: DesklineConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables.
    ///
    /// A variable that is set but does not parse fails with
    /// `ConfigError::InvalidValue` naming the variable and its raw value.
    ///
    /// Environment variables:
    /// - `DESKLINE_MAX_CONFLICT_ATTEMPTS` (default: 3)
    /// - `DESKLINE_QUEUE_CAPACITY` (default: 1024)
    /// - `DESKLINE_DISPATCH_WORKERS` (default: 4)
    /// - `DESKLINE_ENQUEUE_TIMEOUT_MS` (default: 50)
    /// - `DESKLINE_RETRY_BASE_MS` (default: 1000)
    /// - `DESKLINE_RETRY_FACTOR` (default: 2.0)
    /// - `DESKLINE_RETRY_MAX_ATTEMPTS` (default: 5)
    /// - `DESKLINE_AUTO_CLOSE_ENABLED` (default: true)
    /// - `DESKLINE_AUTO_CLOSE_AFTER_SECS` (default: 604800)
    /// - `DESKLINE_AUTO_CLOSE_INTERVAL_SECS` (default: 300)
    /// - `DESKLINE_DEFAULT_TAG` (default: "general")
    /// - `DESKLINE_WEBHOOK_URL` / `DESKLINE_WEBHOOK_SECRET` (webhook channel)
    /// - `DESKLINE_EMAIL_FROM` / `DESKLINE_EMAIL_WATCHERS` (email channel)
    /// - `DESKLINE_BIND` (default: "0.0.0.0:3000")
    /// - `DESKLINE_DEAD_LETTER_PATH` (default: in-memory)
    pub fn from_env() -> DesklineResult<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse("DESKLINE_MAX_CONFLICT_ATTEMPTS")? {
            config.engine.max_conflict_attempts = v;
        }
        if let Some(v) = env_parse("DESKLINE_QUEUE_CAPACITY")? {
            config.dispatcher.queue_capacity = v;
        }
        if let Some(v) = env_parse("DESKLINE_DISPATCH_WORKERS")? {
            config.dispatcher.workers = v;
        }
        if let Some(v) = env_parse("DESKLINE_ENQUEUE_TIMEOUT_MS")? {
            config.dispatcher.enqueue_timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse("DESKLINE_RETRY_BASE_MS")? {
            config.dispatcher.retry.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse("DESKLINE_RETRY_FACTOR")? {
            config.dispatcher.retry.factor = v;
        }
        if let Some(v) = env_parse("DESKLINE_RETRY_MAX_ATTEMPTS")? {
            config.dispatcher.retry.max_attempts = v;
        }
        if let Some(v) = env_parse("DESKLINE_AUTO_CLOSE_ENABLED")? {
            config.auto_close.enabled = v;
        }
        if let Some(v) = env_parse("DESKLINE_AUTO_CLOSE_AFTER_SECS")? {
            config.auto_close.resolved_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse("DESKLINE_AUTO_CLOSE_INTERVAL_SECS")? {
            config.auto_close.check_interval = Duration::from_secs(v);
        }
        if let Ok(v) = std::env::var("DESKLINE_DEFAULT_TAG") {
            config.classifier.default_tag = v;
        }
        if let (Ok(url), Ok(secret)) = (
            std::env::var("DESKLINE_WEBHOOK_URL"),
            std::env::var("DESKLINE_WEBHOOK_SECRET"),
        ) {
            config.channels.webhook = Some(WebhookConfig {
                url,
                secret,
                timeout: default_webhook_timeout(),
            });
        }
        if let Ok(from) = std::env::var("DESKLINE_EMAIL_FROM") {
            let watchers = std::env::var("DESKLINE_EMAIL_WATCHERS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|w| w.trim().to_string())
                        .filter(|w| !w.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            config.channels.email = Some(EmailConfig { from, watchers });
        }
        if let Ok(v) = std::env::var("DESKLINE_BIND") {
            config.server.bind_addr = v;
        }
        if let Ok(v) = std::env::var("DESKLINE_DEAD_LETTER_PATH") {
            config.server.dead_letter_path = Some(PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_conflict_attempts == 0 {
            return Err(invalid(
                "engine.max_conflict_attempts",
                self.engine.max_conflict_attempts,
                "must be at least 1",
            ));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(invalid(
                "dispatcher.queue_capacity",
                self.dispatcher.queue_capacity,
                "must be at least 1",
            ));
        }
        if self.dispatcher.workers == 0 {
            return Err(invalid(
                "dispatcher.workers",
                self.dispatcher.workers,
                "must be at least 1",
            ));
        }

        let retry = &self.dispatcher.retry;
        if retry.max_attempts == 0 {
            return Err(invalid(
                "dispatcher.retry.max_attempts",
                retry.max_attempts,
                "must be at least 1",
            ));
        }
        if !(retry.factor >= 1.0) {
            return Err(invalid(
                "dispatcher.retry.factor",
                retry.factor,
                "must be >= 1.0",
            ));
        }
        if retry.max_delay < retry.base_delay {
            return Err(invalid(
                "dispatcher.retry.max_delay",
                format!("{:?}", retry.max_delay),
                "must not be shorter than base_delay",
            ));
        }

        if self.auto_close.enabled {
            if self.auto_close.check_interval.is_zero() {
                return Err(invalid(
                    "auto_close.check_interval",
                    format!("{:?}", self.auto_close.check_interval),
                    "must be positive",
                ));
            }
            if self.auto_close.batch_size == 0 {
                return Err(invalid(
                    "auto_close.batch_size",
                    self.auto_close.batch_size,
                    "must be at least 1",
                ));
            }
        }

        if self.classifier.default_tag.trim().is_empty() {
            return Err(invalid(
                "classifier.default_tag",
                &self.classifier.default_tag,
                "must not be empty",
            ));
        }

        if let Some(webhook) = &self.channels.webhook {
            if !(webhook.url.starts_with("http://") || webhook.url.starts_with("https://")) {
                return Err(invalid(
                    "channels.webhook.url",
                    &webhook.url,
                    "must be an http(s) URL",
                ));
            }
            if webhook.secret.len() < 16 {
                return Err(invalid(
                    "channels.webhook.secret",
                    "<redacted>",
                    "must be at least 16 characters",
                ));
            }
        }

        if let Some(email) = &self.channels.email {
            if !email.from.contains('@') {
                return Err(invalid(
                    "channels.email.from",
                    &email.from,
                    "must be an email address",
                ));
            }
        }

        if self.server.bind_addr.trim().is_empty() {
            return Err(invalid("server.bind_addr", "", "must not be empty"));
        }

        Ok(())
    }
}

/// Read and parse `key`; unset is `None`, unparsable is an error naming the raw value.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    raw.trim()
        .to_lowercase()
        .parse()
        .map(Some)
        .map_err(|_| invalid(key, &raw, "could not be parsed"))
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
