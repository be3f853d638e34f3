use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("REPORT_STORE=dynamodb requires S3_BUCKET_NAME; inline images exceed the DynamoDB item size limit")]
    InlineImagesInDynamoDb,
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    DynamoDb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub base_url: String,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            base_url: "http://localhost:8081".to_string(),
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitoConfig {
    pub user_pool_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub domain: String,
    pub redirect_uri: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub cognito: Option<CognitoConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            session_ttl_hours: 24,
            cognito: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    pub reports_table: String,
    pub users_table: String,
    pub s3_bucket: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::DynamoDb,
            reports_table: "cropscan-reports".to_string(),
            users_table: "cropscan-users".to_string(),
            s3_bucket: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub classifier: ClassifierConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Loads `.env`, the optional YAML file named by `CONFIG_FILE`, then
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("CONFIG_FILE") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = parse("PORT", &port)?;
        }
        if let Some(base_url) = lookup("BASE_URL") {
            self.server.base_url = base_url;
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }

        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(ttl) = lookup("SESSION_TTL_HOURS") {
            self.auth.session_ttl_hours = parse("SESSION_TTL_HOURS", &ttl)?;
        }
        if let Some(cognito) = cognito_from_lookup(lookup) {
            self.auth.cognito = Some(cognito);
        }

        if let Some(url) = lookup("CLASSIFIER_URL") {
            self.classifier.base_url = url;
        }
        if let Some(secs) = lookup("CLASSIFIER_TIMEOUT_SECS") {
            self.classifier.timeout_secs = parse("CLASSIFIER_TIMEOUT_SECS", &secs)?;
        }

        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.llm.api_key = Some(key).filter(|k| !k.is_empty());
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("GEMINI_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(secs) = lookup("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse("LLM_TIMEOUT_SECS", &secs)?;
        }

        if let Some(store) = lookup("REPORT_STORE") {
            self.storage.backend = match store.as_str() {
                "dynamodb" => StoreBackend::DynamoDb,
                "memory" => StoreBackend::Memory,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "REPORT_STORE",
                        value: store,
                    });
                }
            };
        }
        if let Some(table) = lookup("DYNAMODB_REPORTS_TABLE") {
            self.storage.reports_table = table;
        }
        if let Some(table) = lookup("DYNAMODB_USERS_TABLE") {
            self.storage.users_table = table;
        }
        if let Some(bucket) = lookup("S3_BUCKET_NAME") {
            self.storage.s3_bucket = Some(bucket).filter(|b| !b.is_empty());
        }

        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if self.auth.session_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "SESSION_TTL_HOURS",
                value: self.auth.session_ttl_hours.to_string(),
            });
        }
        url::Url::parse(&self.classifier.base_url).map_err(|_| ConfigError::Invalid {
            key: "CLASSIFIER_URL",
            value: self.classifier.base_url.clone(),
        })?;
        if self.storage.backend == StoreBackend::DynamoDb && self.storage.s3_bucket.is_none() {
            return Err(ConfigError::InlineImagesInDynamoDb);
        }
        Ok(())
    }

    pub fn cognito_configured(&self) -> bool {
        self.auth
            .cognito
            .as_ref()
            .is_some_and(|c| !c.user_pool_id.contains("your_cognito") && !c.client_id.contains("your_cognito"))
    }
}

fn cognito_from_lookup<F>(lookup: &F) -> Option<CognitoConfig>
where
    F: Fn(&str) -> Option<String>,
{
    Some(CognitoConfig {
        user_pool_id: lookup("COGNITO_USER_POOL_ID")?,
        client_id: lookup("COGNITO_CLIENT_ID")?,
        client_secret: lookup("COGNITO_CLIENT_SECRET")?,
        domain: lookup("COGNITO_DOMAIN")?,
        redirect_uri: lookup("COGNITO_REDIRECT_URI")?,
        region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
    })
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
