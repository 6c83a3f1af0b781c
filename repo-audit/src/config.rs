use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4";
/// Characters of a single file sent for review.
pub const DEFAULT_MAX_FILE_CHARS: usize = 3000;
/// Characters of the report sent for the final synthesis.
pub const DEFAULT_MAX_SYNTHESIS_CHARS: usize = 24_000;

/// Everything an audit run needs from its environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub git_executable: PathBuf,
    pub analysis: AnalysisConfig,
    pub container: ContainerConfig,
    /// Parent directory for run workspaces. Defaults to the OS temp dir.
    pub workspace_root: Option<PathBuf>,
    /// Upper bound on concurrent per-file analysis calls.
    pub max_concurrency: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            git_executable: PathBuf::from("git"),
            analysis: AnalysisConfig::default(),
            container: ContainerConfig::default(),
            workspace_root: None,
            max_concurrency: 4,
        }
    }
}

impl AuditConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("invalid audit configuration")
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub max_file_chars: usize,
    pub max_synthesis_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_file_chars: DEFAULT_MAX_FILE_CHARS,
            max_synthesis_chars: DEFAULT_MAX_SYNTHESIS_CHARS,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_file_chars", &self.max_file_chars)
            .field("max_synthesis_chars", &self.max_synthesis_chars)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    pub docker_executable: PathBuf,
    /// Passed to docker as `DOCKER_HOST` when set.
    pub docker_host: Option<String>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            docker_executable: PathBuf::from("docker"),
            docker_host: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.git_executable, PathBuf::from("git"));
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.analysis.model, "gpt-4");
        assert_eq!(config.analysis.max_file_chars, 3000);
        assert!(config.analysis.api_key.is_none());
        assert_eq!(config.container.docker_executable, PathBuf::from("docker"));
    }

    #[test]
    fn workspace_root_falls_back_to_temp_dir() {
        let config = AuditConfig::default();
        assert_eq!(config.workspace_root(), std::env::temp_dir());
    }

    #[test]
    fn parses_partial_toml() {
        let config = AuditConfig::from_toml_str(
            r#"
            git_executable = "/usr/local/bin/git"
            max_concurrency = 2

            [analysis]
            model = "gpt-4o-mini"

            [container]
            docker_host = "tcp://127.0.0.1:2375"
            "#,
        )
        .unwrap();

        assert_eq!(config.git_executable, PathBuf::from("/usr/local/bin/git"));
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.analysis.model, "gpt-4o-mini");
        assert_eq!(config.analysis.api_base, DEFAULT_API_BASE);
        assert_eq!(config.container.docker_host.as_deref(), Some("tcp://127.0.0.1:2375"));
        assert_eq!(config.container.docker_executable, PathBuf::from("docker"));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = AuditConfig::from_toml_str("gti_executable = \"git\"").unwrap_err();
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn from_toml_file_reports_missing_path() {
        let err = AuditConfig::from_toml_file(Path::new("/nonexistent/audit.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let analysis = AnalysisConfig {
            api_key: Some("sk-secret".into()),
            ..AnalysisConfig::default()
        };
        let rendered = format!("{analysis:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
