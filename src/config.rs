use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use log::{info, warn};

use crate::{constants::DEFAULT_PAGE_SIZE, error::TypeError};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub token_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub media_url: String,
    pub page_size: i64,
    pub ingredients_fixture: Option<PathBuf>,
    pub tags_fixture: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self, TypeError> {
        Ok(Self {
            port: try_load("PORT", "8000")?,
            database_url: required("DATABASE_URL")?,
            redis_url: var("REDIS_URL").ok(),
            jwt_secret: required("JWT_SECRET")?,
            token_lifetime_hours: try_load("TOKEN_LIFETIME_HOURS", "24")?,
            media_root: try_load::<String>("MEDIA_ROOT", "media")?.into(),
            media_url: normalize_media_url(&try_load::<String>("MEDIA_URL", "/media/")?),
            page_size: try_load("PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())?,
            ingredients_fixture: var("INGREDIENTS_FIXTURE").ok().map(PathBuf::from),
            tags_fixture: var("TAGS_FIXTURE").ok().map(PathBuf::from),
        })
    }

    /// Configuration for tests and local tooling; nothing is read from the
    /// environment.
    pub fn for_tests(media_root: PathBuf) -> Self {
        Self {
            port: 0,
            database_url: String::new(),
            redis_url: None,
            jwt_secret: "test-secret".to_owned(),
            token_lifetime_hours: 1,
            media_root,
            media_url: "/media/".to_owned(),
            page_size: DEFAULT_PAGE_SIZE,
            ingredients_fixture: None,
            tags_fixture: None,
        }
    }
}

fn var(key: &str) -> Result<String, env::VarError> {
    env::var(key)
}

/// Environment variable first, `/run/secrets/<key>` second.
fn required(key: &str) -> Result<String, TypeError> {
    if let Ok(value) = var(key) {
        return Ok(value);
    }

    read_secret(key).ok_or_else(|| {
        warn!("{key} is neither set nor provided as a secret");
        TypeError::new(&format!("Missing configuration value {key}"))
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, TypeError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            TypeError::new(&format!("Invalid configuration value {key}"))
        })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
}

fn normalize_media_url(url: &str) -> String {
    let trimmed = url.trim_matches('/');
    if trimmed.is_empty() {
        return "/".to_owned();
    }
    format!("/{trimmed}/")
}
