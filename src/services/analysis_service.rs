use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::{AnalyzerCommand, Config};
use crate::error::AppError;
use crate::models::index_entry::{fallback_description, filename_of};

const RESULT_PREFIX: &str = "Result:";
const TEXT_HINTS: &[&str] = &["screenshot", "whatsapp"];
const TEXT_HINT_EXTENSIONS: &[&str] = &["png"];

/// The external capability that turns a media file into a description.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, path: &Path) -> Result<String, AppError>;
}

/// Runs `program args... <path>` and reads the last `Result:` line of stdout.
/// The child is killed if the returned future is dropped.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    command: AnalyzerCommand,
}

impl CommandAnalyzer {
    pub fn new(command: AnalyzerCommand) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    async fn analyze(&self, path: &Path) -> Result<String, AppError> {
        let output = tokio::process::Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AppError::Analysis(format!("failed to run {}: {e}", self.command.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Analysis(format!(
                "{} exited with {}: {}",
                self.command.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_result_line(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| AppError::Analysis("no result line in analyzer output".to_string()))
    }
}

/// Stand-in used when no analyzer program is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameAnalyzer;

#[async_trait]
impl Analyzer for FilenameAnalyzer {
    async fn analyze(&self, path: &Path) -> Result<String, AppError> {
        Ok(fallback_description(path))
    }
}

pub fn parse_result_line(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .rev()
        .filter_map(|line| line.trim().strip_prefix(RESULT_PREFIX))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Filenames that usually carry text worth a second, text-extraction pass.
pub fn likely_has_text(path: &Path) -> bool {
    let name = filename_of(path).to_lowercase();
    if TEXT_HINTS.iter().any(|hint| name.contains(hint)) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_HINT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Bounded-concurrency front door to the analyzers. Never fails: every
/// error or timeout degrades to the filename-derived description.
#[derive(Clone)]
pub struct AnalysisPool {
    primary: Arc<dyn Analyzer>,
    enrichment: Option<Arc<dyn Analyzer>>,
    permits: Arc<Semaphore>,
    limit: usize,
    timeout: Duration,
}

impl AnalysisPool {
    pub fn new(primary: Arc<dyn Analyzer>, limit: usize, timeout: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            primary,
            enrichment: None,
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            timeout,
        }
    }

    pub fn with_enrichment(mut self, enrichment: Arc<dyn Analyzer>) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let primary: Arc<dyn Analyzer> = match &config.analyzer {
            Some(command) => Arc::new(CommandAnalyzer::new(command.clone())),
            None => Arc::new(FilenameAnalyzer),
        };
        let pool = Self::new(
            primary,
            config.max_concurrent_analyses,
            config.analysis_timeout(),
        );
        match &config.enrichment {
            Some(command) => pool.with_enrichment(Arc::new(CommandAnalyzer::new(command.clone()))),
            None => pool,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn analyze(&self, path: &Path) -> String {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(path = %path.display(), "analysis pool closed, using filename");
                return fallback_description(path);
            }
        };

        let description = match self.run_pass(self.primary.as_ref(), path).await {
            Ok(description) => description,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "analysis failed, using filename");
                return fallback_description(path);
            }
        };

        if let Some(enrichment) = &self.enrichment {
            if likely_has_text(path) {
                match self.run_pass(enrichment.as_ref(), path).await {
                    Ok(enriched) => return enriched,
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "enrichment failed, keeping primary");
                    }
                }
            }
        }

        description
    }

    async fn run_pass(&self, analyzer: &dyn Analyzer, path: &Path) -> Result<String, AppError> {
        match tokio::time::timeout(self.timeout, analyzer.analyze(path)).await {
            Ok(Ok(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    Err(AppError::Analysis("empty description".to_string()))
                } else {
                    Ok(text.to_string())
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::Analysis(format!(
                "timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records calls and the peak number of concurrent invocations.
    #[derive(Default)]
    pub struct CountingAnalyzer {
        pub calls: AtomicUsize,
        pub active: AtomicUsize,
        pub peak: AtomicUsize,
        pub delay: Duration,
        pub seen: Mutex<Vec<String>>,
    }

    impl CountingAnalyzer {
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }

        pub fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Analyzer for CountingAnalyzer {
        async fn analyze(&self, path: &Path) -> Result<String, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.seen.lock().unwrap().push(filename_of(path));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("a picture of {}", fallback_description(path)))
        }
    }

    pub struct FailingAnalyzer;

    #[async_trait]
    impl Analyzer for FailingAnalyzer {
        async fn analyze(&self, _path: &Path) -> Result<String, AppError> {
            Err(AppError::Analysis("model crashed".to_string()))
        }
    }

    pub struct SleepingAnalyzer(pub Duration);

    #[async_trait]
    impl Analyzer for SleepingAnalyzer {
        async fn analyze(&self, _path: &Path) -> Result<String, AppError> {
            tokio::time::sleep(self.0).await;
            Ok("too late".to_string())
        }
    }

    pub struct FixedAnalyzer(pub &'static str);

    #[async_trait]
    impl Analyzer for FixedAnalyzer {
        async fn analyze(&self, _path: &Path) -> Result<String, AppError> {
            Ok(self.0.to_string())
        }
    }
}
