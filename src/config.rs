use std::env;
use std::path::PathBuf;

/// Default stale-job threshold: 15 minutes.
const DEFAULT_TRANSCRIPTION_TIMEOUT_SECS: i64 = 900;
/// Default signed media URL lifetime: 1 hour.
const DEFAULT_SIGNED_URL_TTL_SECS: i64 = 3600;

/// Process configuration, collected from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Externally visible base URL, used for webhook and signed media URLs.
    pub public_base_url: String,
    /// sqlite connection string, e.g. `sqlite:data/quickscribe.db`.
    pub database_url: String,
    /// Directory the filesystem blob store writes recordings into.
    pub media_dir: PathBuf,
    /// Secret for signing media read URLs.
    pub media_url_secret: String,
    /// Lifetime of signed media read URLs, in seconds.
    pub signed_url_ttl_secs: i64,
    /// Transcription provider endpoint and key.
    pub transcription_api_url: String,
    pub transcription_api_key: String,
    /// Text-generation provider endpoint and key.
    pub llm_api_url: String,
    pub llm_api_key: String,
    /// How long an in-progress job may go without a status change before the
    /// timeout sweep fails it.
    pub transcription_timeout_secs: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            public_base_url: env_or("PUBLIC_BASE_URL", "http://localhost:8080"),
            database_url: env_or("DATABASE_URL", "sqlite:data/quickscribe.db"),
            media_dir: PathBuf::from(env_or("MEDIA_DIR", "media")),
            media_url_secret: require("MEDIA_URL_SECRET")?,
            signed_url_ttl_secs: env_parsed("SIGNED_URL_TTL_SECS", DEFAULT_SIGNED_URL_TTL_SECS)?,
            transcription_api_url: require("TRANSCRIPTION_API_URL")?,
            transcription_api_key: require("TRANSCRIPTION_API_KEY")?,
            llm_api_url: require("LLM_API_URL")?,
            llm_api_key: require("LLM_API_KEY")?,
            transcription_timeout_secs: env_parsed(
                "TRANSCRIPTION_TIMEOUT_SECS",
                DEFAULT_TRANSCRIPTION_TIMEOUT_SECS,
            )?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("missing required environment variable {key}"))
}

fn env_parsed(key: &str, default: i64) -> anyhow::Result<i64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} must be an integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
