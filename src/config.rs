use anyhow::Context;
use std::env;

/// Runtime configuration, read once at startup and shared through an
/// `Extension` layer.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub secret: String,
    pub port: u16,
    pub debug: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<AppConfig> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL is not defined in the environment")?;
        let secret = env::var("SECRET").context("SECRET is not defined in the environment")?;
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse().context("PORT must be a valid port number")?,
            Err(_) => 8001,
        };
        let debug = matches!(env::var("DEBUG").as_deref(), Ok("1") | Ok("true"));
        Ok(AppConfig {
            database_url,
            secret,
            port,
            debug,
        })
    }
}
