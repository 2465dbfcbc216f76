//! Application configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Environment variable prefix for overrides (`SEVENTV__HTTP__REST_PORT=3100`).
pub const ENV_PREFIX: &str = "SEVENTV";

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Public website URL, used for login redirects.
    pub website_url: String,
    /// Public CDN URL.
    pub cdn_url: String,
    /// Domain set on session and CSRF cookies.
    pub cookie_domain: String,
    /// Whether cookies carry the `Secure` flag.
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    /// Kubernetes identity, echoed in response headers.
    #[serde(default)]
    pub k8s: K8sConfig,
    /// HTTP listener configuration.
    #[serde(default)]
    pub http: HttpConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Object storage configuration.
    pub s3: S3Config,
    /// OAuth platform credentials.
    #[serde(default)]
    pub platforms: PlatformsConfig,
    /// Signing credentials.
    pub credentials: CredentialsConfig,
    /// Message queue names.
    #[serde(default)]
    pub message_queue: MessageQueueConfig,
    /// Rate limit and upload limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Kubernetes identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct K8sConfig {
    /// Node name.
    #[serde(default)]
    pub node_name: String,
    /// Pod name.
    #[serde(default)]
    pub pod_name: String,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Address to bind to.
    #[serde(default = "default_addr")]
    pub addr: String,
    /// REST API port.
    #[serde(default = "default_rest_port")]
    pub rest_port: u16,
    /// Health check port.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
    /// Origins allowed to send credentials.
    #[serde(default)]
    pub cors_whitelist: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            rest_port: default_rest_port(),
            health_port: default_health_port(),
            cors_whitelist: Vec::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Endpoint URL. Empty selects the local filesystem store.
    #[serde(default)]
    pub endpoint: String,
    /// Region name.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key id.
    #[serde(default)]
    pub access_token: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
    /// Bucket holding raw uploads.
    pub internal_bucket: String,
    /// Bucket holding processed, public assets.
    pub public_bucket: String,
    /// Root directory of the local store.
    #[serde(default = "default_local_root")]
    pub local_root: String,
}

/// Credentials for a single OAuth platform.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformConfig {
    /// Whether logins through this platform are accepted.
    #[serde(default)]
    pub enabled: bool,
    /// OAuth client id.
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret.
    #[serde(default)]
    pub client_secret: String,
    /// Redirect URI registered with the platform.
    #[serde(default)]
    pub redirect_uri: String,
}

/// OAuth platform credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatformsConfig {
    /// Twitch.
    #[serde(default)]
    pub twitch: PlatformConfig,
    /// YouTube (Google).
    #[serde(default)]
    pub youtube: PlatformConfig,
    /// Discord.
    #[serde(default)]
    pub discord: PlatformConfig,
    /// Kick (manual verification only).
    #[serde(default)]
    pub kick: PlatformConfig,
}

/// Signing credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// HS256 secret for session and CSRF tokens.
    pub jwt_secret: String,
}

/// Message queue names.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageQueueConfig {
    /// Whether the image processor is reachable at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Outbound job queue consumed by the image processor.
    #[serde(default = "default_jobs_queue")]
    pub image_processor_jobs: String,
    /// Emote results queue.
    #[serde(default = "default_results_queue")]
    pub image_processor_results: String,
    /// Profile picture results queue.
    #[serde(default = "default_picture_results_queue")]
    pub image_processor_user_pictures_results: String,
    /// Seconds a delivery stays invisible before being redelivered.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image_processor_jobs: default_jobs_queue(),
            image_processor_results: default_results_queue(),
            image_processor_user_pictures_results: default_picture_results_queue(),
            visibility_timeout_secs: default_visibility_timeout(),
        }
    }
}

/// Rate limit and upload limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Rate limit buckets as `name: [limit, seconds]`.
    #[serde(default = "default_buckets")]
    pub buckets: HashMap<String, [i64; 2]>,
    /// Upper bound for a single image processing job, in seconds.
    #[serde(default = "default_max_processing_time")]
    pub max_processing_time_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            buckets: default_buckets(),
            max_processing_time_secs: default_max_processing_time(),
        }
    }
}

impl LimitsConfig {
    /// Look up a bucket as `(limit, seconds)`.
    #[must_use]
    pub fn bucket(&self, name: &str) -> Option<(i64, i64)> {
        self.buckets.get(name).map(|[limit, secs]| (*limit, *secs))
    }
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

const fn default_rest_port() -> u16 {
    3100
}

const fn default_health_port() -> u16 {
    9000
}

fn default_log_level() -> String {
    "seventv=debug,tower_http=info".to_string()
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_local_root() -> String {
    "./files".to_string()
}

fn default_jobs_queue() -> String {
    "seventv_image_processor_jobs".to_string()
}

fn default_results_queue() -> String {
    "seventv_image_processor_results".to_string()
}

fn default_picture_results_queue() -> String {
    "seventv_image_processor_user_pictures_results".to_string()
}

const fn default_visibility_timeout() -> u64 {
    30
}

const fn default_max_processing_time() -> u64 {
    300
}

fn default_buckets() -> HashMap<String, [i64; 2]> {
    HashMap::from([
        ("global".to_string(), [500, 60]),
        ("Auth".to_string(), [20, 60]),
        ("CreateEmote".to_string(), [10, 60]),
        ("UpdateUserPicture".to_string(), [2, 60]),
    ])
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from an optional YAML file and environment variables.
    ///
    /// Sources are applied in order:
    /// 1. `.env` (if present)
    /// 2. the file at `path` (if given)
    /// 3. environment variables with the `SEVENTV` prefix and `__` separator
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load configuration from YAML text. Used by tests and tooling.
    pub fn from_yaml(text: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}
