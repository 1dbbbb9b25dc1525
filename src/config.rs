use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use axum::http::HeaderValue;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub media_root: PathBuf,
    pub media_url: String,
    pub session_ttl_days: i64,
    pub login_attempts_per_minute: u32,
    /// Single origin allowed to make credentialed requests. Any origin, without
    /// credentials, when unset.
    pub cors_allow_origin: Option<HeaderValue>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "8000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://films.db?mode=rwc".to_string());

        let media_root =
            PathBuf::from(std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".to_string()));
        let media_url = std::env::var("MEDIA_URL").unwrap_or_else(|_| "/media/".to_string());

        let session_ttl_days: i64 =
            std::env::var("SESSION_TTL_DAYS").ok().and_then(|s| s.parse().ok()).unwrap_or(14);

        let login_attempts_per_minute: u32 = std::env::var("LOGIN_ATTEMPTS_PER_MINUTE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let cors_allow_origin = match std::env::var("CORS_ALLOW_ORIGIN") {
            Ok(origin) if !origin.trim().is_empty() => {
                Some(origin.trim().parse().context("CORS_ALLOW_ORIGIN")?)
            },
            _ => None,
        };

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            media_root,
            media_url,
            session_ttl_days,
            login_attempts_per_minute,
            cors_allow_origin,
        })
    }

    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_days * 86_400
    }
}
