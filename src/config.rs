use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub sender: String,
    /// Public API root that mailed links are built on, including any path
    /// prefix such as `/api/v1`.
    pub base_url: String,
}

/// Argon2 cost parameters for password and token digests.
#[derive(Debug, Clone, Deserialize)]
pub struct HashConfig {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `APP_HOST:APP_PORT`.
    pub listen_addr: SocketAddr,
    /// `None` selects the in-memory datastore.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub hashing: HashConfig,
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parsed_or("APP_PORT", 8080);
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid APP_HOST: {host}"))?;
        let database_url = std::env::var("DATABASE_URL").ok();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "sampleapp".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "sampleapp-users".into()),
            ttl_minutes: parsed_or("JWT_TTL_MINUTES", 60),
        };
        let mail = MailConfig {
            sender: std::env::var("MAIL_SENDER").unwrap_or_else(|_| "noreply@example.com".into()),
            base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api/v1".into()),
        };
        let hashing = HashConfig {
            m_cost: parsed_or("PASSWORD_HASH_M_COST", argon2::Params::DEFAULT_M_COST),
            t_cost: parsed_or("PASSWORD_HASH_T_COST", argon2::Params::DEFAULT_T_COST),
            p_cost: parsed_or("PASSWORD_HASH_P_COST", argon2::Params::DEFAULT_P_COST),
        };
        Ok(Self {
            listen_addr,
            database_url,
            jwt,
            mail,
            hashing,
        })
    }
}
