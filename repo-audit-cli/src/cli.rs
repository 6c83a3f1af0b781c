use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};

use repo_audit::AuditConfig;

/// Audit a git repository: AI code review, container build, tests and a summary
#[derive(Parser)]
#[command(name = "repo-audit", version)]
pub struct Cli {
    /// Repository URL to clone and audit
    pub repo_url: String,

    /// TOML configuration file; flags and environment override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// API key for the chat-completions endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the chat-completions API
    #[arg(long, env = "OPENAI_API_BASE")]
    pub api_base: Option<String>,

    /// Model used for file reviews and the final summary
    #[arg(long, env = "REPO_AUDIT_MODEL")]
    pub model: Option<String>,

    /// git executable used for cloning
    #[arg(long, env = "GIT_EXECUTABLE")]
    pub git: Option<PathBuf>,

    /// docker executable used for building and testing
    #[arg(long, env = "DOCKER_EXECUTABLE")]
    pub docker: Option<PathBuf>,

    /// Docker daemon address passed to docker as DOCKER_HOST
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Directory under which per-run workspaces are created
    #[arg(long, env = "REPO_AUDIT_WORKSPACE_ROOT")]
    pub workspace_root: Option<PathBuf>,

    /// Maximum number of files analyzed concurrently
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Output the run as JSON (also switches logs on stderr to JSON)
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,
}

impl Cli {
    /// Load the config file, if any, and layer flags on top of it.
    pub fn audit_config(&self) -> anyhow::Result<AuditConfig> {
        let mut config = match &self.config {
            Some(path) => AuditConfig::from_toml_file(path)?,
            None => AuditConfig::default(),
        };

        if let Some(key) = &self.api_key {
            config.analysis.api_key = Some(key.clone());
        }
        if let Some(base) = &self.api_base {
            config.analysis.api_base = base.clone();
        }
        if let Some(model) = &self.model {
            config.analysis.model = model.clone();
        }
        if let Some(git) = &self.git {
            config.git_executable = git.clone();
        }
        if let Some(docker) = &self.docker {
            config.container.docker_executable = docker.clone();
        }
        if let Some(host) = &self.docker_host {
            config.container.docker_host = Some(host.clone());
        }
        if let Some(root) = &self.workspace_root {
            config.workspace_root = Some(root.clone());
        }
        if let Some(n) = self.max_concurrency {
            config.max_concurrency = n;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["repo-audit"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "https://example.com/r.git",
            "--model",
            "gpt-4o",
            "--git",
            "/opt/git",
            "--max-concurrency",
            "9",
        ]);
        let config = cli.audit_config().unwrap();
        assert_eq!(config.analysis.model, "gpt-4o");
        assert_eq!(config.git_executable, PathBuf::from("/opt/git"));
        assert_eq!(config.max_concurrency, 9);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.toml");
        std::fs::write(
            &path,
            "max_concurrency = 2\n[analysis]\nmodel = \"from-file\"\napi_base = \"http://localhost:1\"\n",
        )
        .unwrap();

        let cli = parse(&[
            "https://example.com/r.git",
            "--config",
            path.to_str().unwrap(),
            "--model",
            "from-flag",
        ]);
        let config = cli.audit_config().unwrap();
        assert_eq!(config.analysis.model, "from-flag");
        assert_eq!(config.analysis.api_base, "http://localhost:1");
        assert_eq!(config.max_concurrency, 2);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let cli = parse(&["https://example.com/r.git", "--config", "/nonexistent/audit.toml"]);
        assert!(cli.audit_config().is_err());
    }

    #[test]
    fn repo_url_is_required() {
        assert!(Cli::try_parse_from(["repo-audit"]).is_err());
    }
}
