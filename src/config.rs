use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "svg", "heic", "heif",
];
const DEFAULT_CONCURRENCY: usize = 2;
const DEFAULT_BATCH_SIZE: usize = 2;
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 90;
const DEFAULT_RESCAN_AFTER_HOURS: u64 = 24;

const ENV_ROOT: &str = "MEDIADEX_ROOT";
const ENV_INDEX_PATH: &str = "MEDIADEX_INDEX_PATH";
const ENV_CONCURRENCY: &str = "MEDIADEX_CONCURRENCY";

/// External program invoked as `program args... <file>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub root: PathBuf,
    pub index_path: Option<PathBuf>,
    pub extensions: Vec<String>,
    pub max_concurrent_analyses: usize,
    pub batch_size: usize,
    pub analysis_timeout_secs: u64,
    pub analyzer: Option<AnalyzerCommand>,
    pub enrichment: Option<AnalyzerCommand>,
    pub rescan_after_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            index_path: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_concurrent_analyses: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            analysis_timeout_secs: DEFAULT_ANALYSIS_TIMEOUT_SECS,
            analyzer: None,
            enrichment: None,
            rescan_after_hours: DEFAULT_RESCAN_AFTER_HOURS,
        }
    }
}

impl Config {
    /// Reads `path` (if given), applies environment overrides, then normalizes.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    AppError::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                serde_json::from_str::<Config>(&raw).map_err(|e| {
                    AppError::Config(format!("failed to parse {}: {e}", path.display()))
                })?
            }
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        Ok(config.normalized())
    }

    fn apply_env_overrides(&mut self) -> Result<(), AppError> {
        if let Some(root) = non_empty_env(ENV_ROOT) {
            self.root = PathBuf::from(root);
        }
        if let Some(index_path) = non_empty_env(ENV_INDEX_PATH) {
            self.index_path = Some(PathBuf::from(index_path));
        }
        if let Some(raw) = non_empty_env(ENV_CONCURRENCY) {
            self.max_concurrent_analyses = raw.parse().map_err(|_| {
                AppError::Config(format!("{ENV_CONCURRENCY} is not a number: {raw}"))
            })?;
        }
        Ok(())
    }

    pub fn normalized(mut self) -> Self {
        self.max_concurrent_analyses = self.max_concurrent_analyses.max(1);
        self.batch_size = self.batch_size.max(1);
        self.analysis_timeout_secs = self.analysis_timeout_secs.max(1);
        self.extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.extensions.sort();
        self.extensions.dedup();
        self
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    pub fn rescan_after(&self) -> Duration {
        Duration::from_secs(self.rescan_after_hours.saturating_mul(60 * 60))
    }

    /// Root with symlinks resolved when possible, so watcher paths line up.
    pub fn resolved_root(&self) -> PathBuf {
        self.root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone())
    }

    /// Explicit `index_path`, or one file per root under the user data dir.
    pub fn resolved_index_path(&self) -> PathBuf {
        if let Some(path) = &self.index_path {
            return path.clone();
        }

        let root = self.resolved_root();
        let digest = blake3::hash(root.to_string_lossy().as_bytes()).to_hex();
        let file_name = format!("index-{}.json", &digest.as_str()[..16]);

        match directories::ProjectDirs::from("dev", "mediadex", "mediadex") {
            Some(dirs) => dirs.data_dir().join(file_name),
            None => PathBuf::from("./data").join(file_name),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
