use serde::Deserialize;
use vigil_notify::NotifyConfig;
use vigil_pipeline::PipelineConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            pipeline: PipelineConfig::default(),
            notify: NotifyConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{path}': {e}"))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config '{path}': {e}"))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL. Defaults to `vigil.db` inside `data_dir`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            data_dir: default_data_dir(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}/vigil.db?mode=rwc", self.data_dir),
        }
    }

    /// Connection URL with any password replaced, for logging.
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                let creds = &url[scheme_end + 3..at];
                match creds.find(':') {
                    Some(colon) => format!(
                        "{}{}:***{}",
                        &url[..scheme_end + 3],
                        &creds[..colon],
                        &url[at..]
                    ),
                    None => url,
                }
            }
            _ => url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Required when `backend = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,
}

/// One bearer key, bound to exactly one org.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub org_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Widest `[start, end)` window the history endpoints accept.
    #[serde(default = "default_max_list_span_days")]
    pub max_list_span_days: i64,
    #[serde(default)]
    pub keys: Vec<ApiKey>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_list_span_days: default_max_list_span_days(),
            keys: Vec::new(),
        }
    }
}

// ---- Seed file types (used by the `seed` CLI subcommand) ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub orgs: Vec<SeedOrg>,
    #[serde(default)]
    pub devices: Vec<SeedDevice>,
    #[serde(default)]
    pub rules: Vec<SeedRule>,
    #[serde(default)]
    pub alarms: Vec<SeedAlarm>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedOrg {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDevice {
    #[serde(default)]
    pub id: String,
    pub org_id: String,
    pub unique_id: String,
    #[serde(default)]
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRule {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub device_tag: String,
    pub attr: String,
    pub expr: String,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAlarm {
    pub id: String,
    pub org_id: String,
    pub rule_id: String,
    pub name: String,
    /// `app`, `sms` or `email`.
    pub alarm_type: String,
    #[serde(default)]
    pub user_tags: Vec<String>,
    pub subject_template: String,
    pub body_template: String,
    #[serde(default)]
    pub repeat_interval_secs: u32,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub id: String,
    pub org_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default = "default_seed_role")]
    pub role: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_seed_enabled")]
    pub enabled: bool,
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_max_list_span_days() -> i64 {
    90
}

fn default_seed_enabled() -> bool {
    true
}

fn default_seed_role() -> String {
    "viewer".to_string()
}
