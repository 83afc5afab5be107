use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::settings::PersistentSettings;

/// Accessibility scan service: headless page snapshots
/// analysed by an external model, results served over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "a11y-scanner")]
pub struct CliArgs {
    /// HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory holding scanner.db and settings.json
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Maximum number of scans running at once
    #[arg(short = 'w', long = "workers", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Pending scans the queue accepts before admission answers 503
    #[arg(long = "queue-capacity", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Model name sent to the inference service
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Base URL of an OpenAI-compatible inference API
    #[arg(long = "inference-url")]
    pub inference_url: Option<String>,

    /// Local ceiling on one inference call
    #[arg(long = "inference-timeout-secs", default_value_t = DEFAULT_INFERENCE_TIMEOUT_SECS)]
    pub inference_timeout_secs: u64,

    /// Credits granted to a user the first time they are seen
    #[arg(long = "signup-credits")]
    pub signup_credits: Option<i64>,

    /// Non-terminal scans older than this are failed by the reconciler
    #[arg(long = "stale-after-secs", default_value_t = DEFAULT_STALE_AFTER_SECS)]
    pub stale_after_secs: u64,

    /// Chrome/Chromium executable
    #[arg(long = "chrome")]
    pub chrome: Option<PathBuf>,

    /// Write a daily rolling log file into this directory
    #[arg(short = 'l', long = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub workers: usize,
    pub queue_capacity: usize,
    pub model: String,
    pub inference_url: String,
    pub inference_api_key: Option<String>,
    pub inference_timeout: Duration,
    pub signup_credits: i64,
    pub stale_after: Duration,
    pub chrome: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

// Server constants
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DB_FILENAME: &str = "scanner.db";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const USER_ID_HEADER: &str = "x-user-id";

// Ledger constants
pub const DEFAULT_SIGNUP_CREDITS: i64 = 3;

// Extraction constants
pub const NAVIGATION_TIMEOUT_SECS: u64 = 30;
pub const NETWORK_IDLE_POLL_MS: u64 = 100;
pub const NETWORK_IDLE_QUIET_MS: u64 = 500;

// Inference constants
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_INFERENCE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 60;
pub const INFERENCE_TEMPERATURE: f32 = 0.3;
pub const INFERENCE_MAX_TOKENS: u32 = 2000;
pub const PROMPT_ELEMENTS_PER_CATEGORY: usize = 10;
pub const PROMPT_MARKUP_CHARS: usize = 300;
pub const FALLBACK_SCORE: i64 = 75;

// Reconciler constants
pub const DEFAULT_STALE_AFTER_SECS: u64 = 900; // 15 minutes
pub const RECONCILE_INTERVAL_SECS: u64 = 60;

// Activity log constants
pub const ACTIVITY_BUFFER_SIZE: usize = 500;

impl ScannerConfig {
    /// Resolve CLI args against persisted settings: explicit CLI values win,
    /// then settings.json, then built-in defaults.
    pub fn from_args(args: CliArgs, settings: &PersistentSettings) -> Self {
        let data_dir = args.data_dir.unwrap_or_else(default_data_dir);

        let model = args
            .model
            .or_else(|| settings.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let inference_url = args
            .inference_url
            .or_else(|| settings.inference_url.clone())
            .unwrap_or_else(|| DEFAULT_INFERENCE_URL.to_string());
        let signup_credits = args
            .signup_credits
            .or(settings.signup_credits)
            .unwrap_or(DEFAULT_SIGNUP_CREDITS)
            .max(0);

        let inference_api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty());

        ScannerConfig {
            port: args.port,
            data_dir,
            workers: args.workers.max(1),
            queue_capacity: args.queue_capacity.max(1),
            model,
            inference_url,
            inference_api_key,
            inference_timeout: Duration::from_secs(args.inference_timeout_secs.max(1)),
            signup_credits,
            stale_after: Duration::from_secs(args.stale_after_secs),
            chrome: args.chrome,
            log_dir: args.log_dir,
        }
    }

    /// Path to the SQLite database
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILENAME)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            port: DEFAULT_PORT,
            data_dir: default_data_dir(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            model: DEFAULT_MODEL.to_string(),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            inference_api_key: None,
            inference_timeout: Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS),
            signup_credits: DEFAULT_SIGNUP_CREDITS,
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            chrome: None,
            log_dir: None,
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("a11y-scanner")
}
