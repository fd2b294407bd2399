use crate::blast::{FilterConfig, PollSettings, SearchParameters};
use crate::error::{PipelineError, PipelineResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// NCBI asks URL API clients to keep concurrent searches low.
pub const MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub search: SearchParameters,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub submit_timeout_secs: u64,
    pub poll_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://blast.ncbi.nlm.nih.gov/Blast.cgi".to_string(),
            submit_timeout_secs: 30,
            poll_timeout_secs: 30,
            user_agent: format!("webblast-tools/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub backoff_secs: u64,
    pub max_attempts: u32,
    pub min_payload_bytes: usize,
    pub result_marker: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            backoff_secs: 0,
            max_attempts: 60,
            min_payload_bytes: 1000,
            result_marker: "<BlastOutput>".to_string(),
        }
    }
}

impl PollingConfig {
    pub fn settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.interval_secs),
            backoff: Duration::from_secs(self.backoff_secs),
            max_attempts: self.max_attempts.max(1),
            min_payload_bytes: self.min_payload_bytes,
            result_marker: self.result_marker.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub concurrency: usize,
    pub stagger_secs: f64,
    /// Zero disables the run-level timeout.
    pub run_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            stagger_secs: 2.0,
            run_timeout_secs: 5 * 3600,
        }
    }
}

impl SchedulerConfig {
    pub fn concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    /// Negative values mean no stagger. Values too large for a `Duration`
    /// are rejected.
    pub fn stagger(&self) -> PipelineResult<Duration> {
        Duration::try_from_secs_f64(self.stagger_secs.max(0.0))
            .map_err(|e| PipelineError::Config(format!("stagger_secs = {}: {}", self.stagger_secs, e)))
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub save_raw_payloads: bool,
    pub write_hit_tables: bool,
    pub max_stored_hits: Option<usize>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_raw_payloads: true,
            write_hit_tables: true,
            max_stored_hits: Some(10),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "webblast", "webblast-tools")
}

impl Config {
    /// Path of the per-user config file, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads the per-user config, falling back to defaults when it is absent
    /// or unreadable.
    pub fn load() -> Self {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                if let Ok(content) = fs::read_to_string(&config_path) {
                    if let Ok(config) = toml::from_str(&content) {
                        return config;
                    }
                }
                tracing::warn!(path = %config_path.display(), "Ignoring unreadable config file");
            }
        }
        Config::default()
    }

    /// Loads an explicitly requested config file. Errors are not swallowed.
    pub fn from_path(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn save_to(&self, path: &Path) -> PipelineResult<()> {
        let fail = |e: &dyn std::fmt::Display| PipelineError::Config(format!("{}: {}", path.display(), e));
        if let Some(config_dir) = path.parent() {
            fs::create_dir_all(config_dir).map_err(|e| fail(&e))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| fail(&e))?;
        fs::write(path, content).map_err(|e| fail(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scheduler]
            concurrency = 20

            [filter]
            max_evalue = 0.001
            exclude_organisms = ["mycoplasma", "spiroplasma"]
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.concurrency(), MAX_CONCURRENCY);
        assert_eq!(config.scheduler.stagger_secs, 2.0);
        assert_eq!(config.filter.max_evalue, 0.001);
        assert_eq!(config.filter.min_identity, 30.0);
        assert_eq!(config.filter.exclude_organisms.len(), 2);
        assert_eq!(config.search.program, "blastp");
        assert_eq!(config.polling.max_attempts, 60);
    }

    #[test]
    fn test_polling_settings() {
        let polling = PollingConfig {
            interval_secs: 15,
            backoff_secs: 2,
            max_attempts: 0,
            ..PollingConfig::default()
        };
        let settings = polling.settings();

        assert_eq!(settings.delay_before(1), Duration::from_secs(17));
        assert_eq!(settings.max_attempts, 1);
    }

    #[test]
    fn test_run_timeout_zero_disables() {
        let scheduler = SchedulerConfig {
            run_timeout_secs: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(scheduler.run_timeout(), None);
        assert_eq!(SchedulerConfig::default().run_timeout(), Some(Duration::from_secs(18000)));
    }

    #[test]
    fn test_stagger_out_of_range_is_config_error() {
        let stagger = |secs: f64| {
            SchedulerConfig {
                stagger_secs: secs,
                ..SchedulerConfig::default()
            }
            .stagger()
        };

        assert_eq!(stagger(1.5).unwrap(), Duration::from_millis(1500));
        assert_eq!(stagger(-3.0).unwrap(), Duration::ZERO);
        assert!(matches!(stagger(1e20), Err(PipelineError::Config(_))));
        assert!(matches!(stagger(f64::INFINITY), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_from_path_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler\nconcurrency = ").unwrap();

        assert!(matches!(Config::from_path(&path), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_save_to_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.scheduler.concurrency = 3;
        config.output.max_stored_hits = None;

        config.save_to(&path).unwrap();
        let loaded = Config::from_path(&path).unwrap();

        assert_eq!(loaded.scheduler.concurrency, 3);
        assert_eq!(loaded.output.max_stored_hits, None);
        assert_eq!(loaded.search, config.search);
    }
}
