//! Runtime configuration
//!
//! Settings come from a YAML file found in one of the standard locations,
//! with every field defaulted and individually overridable through
//! environment variables. The audit section carries the pipeline tuning:
//! skip lists, redaction patterns, body-size cap, queue sizing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Deployment environment name (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_expiry")]
    pub token_expiry_hours: u64,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
}

fn default_token_expiry() -> u64 {
    24
}

fn default_password_min_length() -> usize {
    8
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default = "default_log_target")]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix (default: "incidenthub")
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation (default: true for production)
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to console (stdout/stderr) - default for development
    #[default]
    Console,
    /// Log to file with optional rotation - recommended for production
    File,
    /// Log to both console and file
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_target() -> LogTarget {
    LogTarget::Console
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/incidenthub")
}

fn default_log_prefix() -> String {
    "incidenthub".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            target: default_log_target(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

/// Audit pipeline configuration
///
/// Controls which requests get audited, how sensitive payload fields are
/// scrubbed, and how entries are delivered to the rotating log channel and
/// the database trail.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Directory for the rotating audit log files
    #[serde(default = "default_audit_log_dir")]
    pub log_dir: PathBuf,
    /// Audit log file name prefix
    #[serde(default = "default_audit_log_channel")]
    pub log_channel: String,
    /// Minimum severity the audit channel accepts; audit documents are
    /// emitted at info, so a threshold above info silences the channel
    #[serde(default = "default_audit_log_level")]
    pub log_level: String,
    /// Days of audit history the prune pass keeps
    #[serde(default = "default_audit_retention_days")]
    pub retention_days: u32,
    /// Endpoints excluded from auditing (matched against the request path
    /// with the leading slash removed, by equality or prefix)
    #[serde(default = "default_audit_skip_endpoints")]
    pub skip_endpoints: Vec<String>,
    /// Field name substrings whose values are replaced entirely
    #[serde(default = "default_audit_redact_fields")]
    pub redact_fields: Vec<String>,
    /// Field name substrings whose values are masked but keep hints
    #[serde(default = "default_audit_mask_fields")]
    pub mask_fields: Vec<String>,
    /// Captured payloads larger than this are replaced by a truncation marker
    #[serde(default = "default_audit_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Persist audit entries to the api_audit_logs table
    #[serde(default = "default_audit_store_database")]
    pub store_in_database: bool,
    /// Bounded dispatch queue capacity; entries beyond it are dropped
    #[serde(default = "default_audit_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of background dispatch workers
    #[serde(default = "default_audit_workers")]
    pub workers: usize,
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_dir() -> PathBuf {
    PathBuf::from("/var/log/incidenthub/audit")
}

fn default_audit_log_channel() -> String {
    "audit".to_string()
}

fn default_audit_log_level() -> String {
    "info".to_string()
}

fn default_audit_retention_days() -> u32 {
    90
}

fn default_audit_skip_endpoints() -> Vec<String> {
    vec![
        "health".to_string(),
        "metrics".to_string(),
        "ping".to_string(),
    ]
}

fn default_audit_redact_fields() -> Vec<String> {
    [
        "password",
        "password_confirmation",
        "current_password",
        "new_password",
        "api_token",
        "token",
        "access_token",
        "refresh_token",
        "secret",
        "secret_key",
        "private_key",
        "auth_token",
        "bearer_token",
        "credit_card",
        "cvv",
        "cvc",
        "ssn",
        "social_security",
        "pin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_audit_mask_fields() -> Vec<String> {
    ["email", "phone", "card_number", "account_number", "iban"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_audit_max_body_bytes() -> usize {
    10240
}

fn default_audit_store_database() -> bool {
    true
}

fn default_audit_queue_capacity() -> usize {
    1024
}

fn default_audit_workers() -> usize {
    2
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_dir: default_audit_log_dir(),
            log_channel: default_audit_log_channel(),
            log_level: default_audit_log_level(),
            retention_days: default_audit_retention_days(),
            skip_endpoints: default_audit_skip_endpoints(),
            redact_fields: default_audit_redact_fields(),
            mask_fields: default_audit_mask_fields(),
            max_body_bytes: default_audit_max_body_bytes(),
            store_in_database: default_audit_store_database(),
            queue_capacity: default_audit_queue_capacity(),
            workers: default_audit_workers(),
        }
    }
}

impl AuditConfig {
    /// Check whether a request path is excluded from auditing
    ///
    /// Matching mirrors the skip-endpoint semantics: the path is compared
    /// without its leading slash, and an entry matches on equality or as a
    /// prefix (so "health" also covers "health/live" and "health/ready").
    pub fn is_exempt_path(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        self.skip_endpoints.iter().any(|skip| {
            let skip = skip.trim_start_matches('/');
            !skip.is_empty() && (path == skip || path.starts_with(skip))
        })
    }

    /// Whether the configured channel threshold lets info-severity audit
    /// documents through to the log sink
    pub fn log_channel_enabled(&self) -> bool {
        !matches!(
            self.log_level.to_lowercase().as_str(),
            "warn" | "warning" | "error" | "off"
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                workers: default_workers(),
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production-minimum-32-characters-long".to_string(),
                token_expiry_hours: default_token_expiry(),
                password_min_length: default_password_min_length(),
            },
            database: DatabaseConfig {
                url: "sqlite://./data/incidenthub.db".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            logging: LoggingConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load settings: defaults, then the YAML file, then environment
    /// variables, each layer overriding the previous one
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("INCIDENTHUB_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_norway::from_str::<AppConfig>(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            } else {
                eprintln!(
                    "[CONFIG] Config file path set but file not found: {:?}",
                    path
                );
                AppConfig::default()
            }
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// First existing file among the conventional locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            // Current directory
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            // System config directory
            PathBuf::from("/etc/incidenthub/config.yaml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("incidenthub/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("APP_ENV") {
            self.environment = env;
        }

        if let Ok(host) = std::env::var("INCIDENTHUB_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("INCIDENTHUB_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("INCIDENTHUB_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Ok(target) = std::env::var("INCIDENTHUB_LOG_TARGET") {
            self.logging.target = match target.to_lowercase().as_str() {
                "file" => LogTarget::File,
                "both" => LogTarget::Both,
                _ => LogTarget::Console,
            };
        }
        if let Ok(dir) = std::env::var("INCIDENTHUB_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
        if let Ok(prefix) = std::env::var("INCIDENTHUB_LOG_PREFIX") {
            self.logging.log_prefix = prefix;
        }
        if let Ok(rotation) = std::env::var("INCIDENTHUB_LOG_ROTATION") {
            self.logging.daily_rotation = rotation.parse().unwrap_or(true);
        }

        if let Ok(enabled) = std::env::var("AUDIT_ENABLED") {
            self.audit.enabled = enabled.parse().unwrap_or(true);
        }
        if let Ok(dir) = std::env::var("AUDIT_LOG_DIR") {
            self.audit.log_dir = PathBuf::from(dir);
        }
        if let Ok(channel) = std::env::var("AUDIT_LOG_CHANNEL") {
            self.audit.log_channel = channel;
        }
        if let Ok(level) = std::env::var("AUDIT_LOG_LEVEL") {
            self.audit.log_level = level;
        }
        if let Ok(days) = std::env::var("AUDIT_RETENTION_DAYS") {
            if let Ok(d) = days.parse() {
                self.audit.retention_days = d;
            }
        }
        if let Ok(endpoints) = std::env::var("AUDIT_SKIP_ENDPOINTS") {
            self.audit.skip_endpoints = parse_csv_list(&endpoints);
        }
        if let Ok(fields) = std::env::var("AUDIT_REDACT_FIELDS") {
            self.audit.redact_fields = parse_csv_list(&fields);
        }
        if let Ok(fields) = std::env::var("AUDIT_MASK_FIELDS") {
            self.audit.mask_fields = parse_csv_list(&fields);
        }
        if let Ok(bytes) = std::env::var("AUDIT_MAX_BODY_BYTES") {
            if let Ok(b) = bytes.parse() {
                self.audit.max_body_bytes = b;
            }
        }
        if let Ok(store) = std::env::var("AUDIT_STORE_DATABASE") {
            self.audit.store_in_database = store.parse().unwrap_or(true);
        }
        if let Ok(capacity) = std::env::var("AUDIT_QUEUE_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.audit.queue_capacity = c;
            }
        }
        if let Ok(workers) = std::env::var("AUDIT_WORKERS") {
            if let Ok(w) = workers.parse() {
                self.audit.workers = w;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters long");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.audit.max_body_bytes == 0 {
            anyhow::bail!("audit.max_body_bytes must be greater than 0");
        }
        if self.audit.queue_capacity == 0 {
            anyhow::bail!("audit.queue_capacity must be greater than 0");
        }
        if self.audit.workers == 0 {
            anyhow::bail!("audit.workers must be at least 1");
        }

        Ok(())
    }

    /// Write the default settings out as a starter YAML file
    pub fn create_default_config(path: &PathBuf) -> Result<()> {
        let config = AppConfig::default();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_norway::to_string(&config)?;
        std::fs::write(path, yaml)?;

        Ok(())
    }
}

fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
