use clap::{Parser, ValueEnum};

pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 10 * 1024 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ObjectStoreKind {
    /// S3-compatible backends, addressed with each app's own credentials.
    S3,
    /// Process-local store for development; contents vanish on restart.
    Memory,
}

/// Server configuration. Every flag falls back to an environment variable,
/// and `.env` is loaded before parsing.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Multi-tenant upload orchestration and image delivery")]
pub struct Config {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// HS256 secret used to verify the `session` cookie.
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    #[arg(long, env = "OBJECT_STORE", value_enum, default_value_t = ObjectStoreKind::S3)]
    pub object_store: ObjectStoreKind,

    /// Files larger than this many bytes should be sent with multipart upload.
    #[arg(long, env = "MULTIPART_THRESHOLD", default_value_t = DEFAULT_MULTIPART_THRESHOLD)]
    pub multipart_threshold: u64,
}

impl Config {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
