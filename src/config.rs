use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::remote::{ContentsTarget, RetryPolicy};

const DEFAULT_GITHUB_API: &str = "https://api.github.com";

pub struct Config {
    pub bind_addr: String,
    pub data_file: PathBuf,
    pub admin_password: Option<String>,
    pub sections_file: Option<PathBuf>,
    pub static_dir: PathBuf,
    pub remote_url: Option<String>,
    pub save_url: Option<String>,
    pub github_token: Option<String>,
    pub contents_target: Option<ContentsTarget>,
    pub retry: RetryPolicy,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let contents_target = match (var("GITHUB_OWNER"), var("GITHUB_REPO")) {
            (Some(owner), Some(repo)) => Some(ContentsTarget {
                api_base: var("GITHUB_API").unwrap_or_else(|| DEFAULT_GITHUB_API.to_string()),
                owner,
                repo,
                path: var("GITHUB_PATH").unwrap_or_else(|| "data.json".to_string()),
            }),
            _ => None,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: var("PRODBOARD_PUSH_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_attempts),
            initial_backoff: var("PRODBOARD_PUSH_BACKOFF_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
            ..defaults
        };

        Config {
            bind_addr: var("PRODBOARD_BIND").unwrap_or_else(|| "127.0.0.1:3000".to_string()),
            data_file: var("PRODBOARD_DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("database/prodboard.bin.gz")),
            admin_password: var("PRODBOARD_ADMIN_PASSWORD"),
            sections_file: var("PRODBOARD_SECTIONS_FILE").map(PathBuf::from),
            static_dir: var("PRODBOARD_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
            remote_url: var("PRODBOARD_REMOTE_URL"),
            save_url: var("PRODBOARD_SAVE_URL"),
            github_token: var("GITHUB_TOKEN"),
            contents_target,
            retry,
        }
    }
}
