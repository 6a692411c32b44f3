use clap::{ArgAction, Parser};
use shortlink_core::EvictionPolicy;
use std::path::PathBuf;

/// Command-line configuration; every flag can also come from the environment
#[derive(Debug, Clone, Parser)]
#[command(name = "shortlink-server", version, about = "Alias resolution service")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// PostgreSQL connection string. Aliases are kept in memory when unset.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub database_max_connections: u32,

    /// Reject create requests that carry no alias
    #[arg(long, env = "DISABLE_RANDOM_ALIAS")]
    pub disable_random_alias: bool,

    /// Raise log verbosity from errors only (-v warn, -vv info, -vvv debug, -vvvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Number of alias resolutions held in memory
    #[arg(long, env = "CACHE_SIZE", default_value_t = 100)]
    pub cache_size: usize,

    /// Directory generated QR codes are written to
    #[arg(long, env = "QR_CODE_CACHE_PATH")]
    pub qr_code_cache_path: PathBuf,

    /// Maximum number of QR code files kept before eviction
    #[arg(long, env = "QR_CODE_CACHE_SIZE", default_value_t = 100)]
    pub qr_code_cache_size: usize,

    /// Public base URL encoded into QR codes, e.g. http://localhost:8000
    #[arg(long, env = "QR_CODE_BASE_URL")]
    pub qr_code_base_url: String,

    /// Image placed in the centre of every QR code
    #[arg(long, env = "QR_CODE_CENTER_IMAGE_PATH")]
    pub qr_code_center_image_path: Option<PathBuf>,

    /// JSON file the QR code index is saved to on shutdown and restored from on startup
    #[arg(long, env = "CACHE_STATE_FILE")]
    pub cache_state_file: Option<PathBuf>,

    /// Which QR code to drop when the cache is full
    #[arg(long, env = "ARTIFACT_EVICTION", default_value_t = EvictionPolicy::Newest)]
    pub artifact_eviction: EvictionPolicy,
}

impl Config {
    /// Log directive for this crate and its libraries
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        }
    }
}
