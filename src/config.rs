use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Settings read from the environment (and `.env`, when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub flags_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenv().is_ok();

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());

        let flags_file = env::var("LD_FLAGS_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            log_level,
            flags_file,
        }
    }
}
