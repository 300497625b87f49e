use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub external: ExternalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Key for hashing session tokens. A per-process key is used when unset,
    /// which logs everybody out on restart.
    #[serde(default)]
    pub session_secret: Option<String>,
    #[serde(skip, default = "generate_session_secret")]
    pub(crate) generated_secret: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Mark the session cookie `Secure` (set when served behind HTTPS)
    #[serde(default)]
    pub cookie_secure: bool,
    /// Bootstrap admin account ensured at startup
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: None,
            generated_secret: generate_session_secret(),
            session_ttl_hours: default_session_ttl_hours(),
            cookie_secure: false,
            admin_email: None,
            admin_password: None,
            admin_name: default_admin_name(),
        }
    }
}

fn generate_session_secret() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl AuthConfig {
    /// The configured secret, or the per-process one
    pub fn session_key(&self) -> &str {
        match self.session_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => secret,
            _ => &self.generated_secret,
        }
    }

    pub fn has_session_secret(&self) -> bool {
        self.session_secret.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

/// Image host credentials. Photos are kept on local disk when these are missing.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Folder on the image host that uploads are placed in
    #[serde(default = "default_media_folder")]
    pub folder: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: default_media_folder(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl MediaConfig {
    pub fn has_remote_host(&self) -> bool {
        [&self.cloud_name, &self.api_key, &self.api_secret]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

fn default_media_folder() -> String {
    "crayon/students".to_string()
}

fn default_max_upload_bytes() -> usize {
    1024 * 1024
}

/// Chat-completions provider used for suggestions. Canned answers are served when unset.
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_ai_model(),
            endpoint: default_ai_endpoint(),
        }
    }
}

impl AiConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            && !self.model.trim().is_empty()
    }
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalConfig {
    /// Upper bound for any call to the image host, AI provider or photo fetch
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Overlay credentials and server settings from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get("CRAYON_HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("CRAYON_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid CRAYON_PORT: {}", port))?;
        }
        if let Some(dir) = get("CRAYON_DATA_DIR") {
            self.server.data_dir = PathBuf::from(dir);
        }
        if let Some(secret) = get("SESSION_SECRET") {
            self.auth.session_secret = Some(secret);
        }
        if let Some(email) = get("CRAYON_ADMIN_EMAIL") {
            self.auth.admin_email = Some(email);
        }
        if let Some(password) = get("CRAYON_ADMIN_PASSWORD") {
            self.auth.admin_password = Some(password);
        }
        if let Some(v) = get("CLOUDINARY_CLOUD_NAME") {
            self.media.cloud_name = Some(v);
        }
        if let Some(v) = get("CLOUDINARY_API_KEY") {
            self.media.api_key = Some(v);
        }
        if let Some(v) = get("CLOUDINARY_API_SECRET") {
            self.media.api_secret = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.ai.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.ai.model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.ai.endpoint = v;
        }
        Ok(())
    }

    /// Log which external services fall back to their local stand-ins.
    pub fn warn_missing_credentials(&self) {
        if !self.auth.has_session_secret() {
            warn!("Session secret not set; using a per-process key, sessions end on restart");
        }
        if !self.media.has_remote_host() {
            warn!("Image host credentials not set; photos are stored under the data directory");
        }
        if !self.ai.is_configured() {
            warn!("AI provider key not set; suggestions use canned fallback text");
        }
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_secs(self.external.timeout_secs.max(1))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.server.data_dir.join("uploads")
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            media: MediaConfig::default(),
            ai: AiConfig::default(),
            external: ExternalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
