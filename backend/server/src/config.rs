use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::error::ConfigError;

pub struct Config {
    pub port: u16,
    pub redis_url: Option<String>,
    pub neis_url: String,
    pub neis_key: String,
    pub office_code: String,
    pub school_kind: String,
    pub openai_url: String,
    pub openai_key: String,
    pub openai_model: String,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_ok() {
            info!("Loaded .env file");
        }

        Ok(Self {
            port: try_load("RUST_PORT", "8080")?,
            redis_url: var("REDIS_URL").ok(),
            neis_url: try_load("NEIS_BASE_URL", "https://open.neis.go.kr/hub")?,
            neis_key: read_secret("NEIS_API_KEY")?,
            office_code: try_load("NEIS_OFFICE_CODE", "T10")?,
            school_kind: try_load("NEIS_SCHOOL_KIND", "고등학교")?,
            openai_url: try_load("OPENAI_BASE_URL", "https://api.openai.com/v1")?,
            openai_key: read_secret("OPENAI_API_KEY")?,
            openai_model: try_load("OPENAI_MODEL", "gpt-4o-mini")?,
            static_dir: try_load("STATIC_DIR", "static")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            redis_url: None,
            neis_url: "https://open.neis.go.kr/hub".to_string(),
            neis_key: String::new(),
            office_code: "T10".to_string(),
            school_kind: "고등학교".to_string(),
            openai_url: "https://api.openai.com/v1".to_string(),
            openai_key: String::new(),
            openai_model: "gpt-4o-mini".to_string(),
            static_dir: PathBuf::from("static"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

fn read_secret(secret_name: &str) -> Result<String, ConfigError> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .or_else(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
            env::var(secret_name).map(|s| s.trim().to_string())
        })
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingSecret(secret_name.to_string()))
}
