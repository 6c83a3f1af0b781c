use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::RepoCloner;
use crate::stage::StageResult;

/// Clones through an external `git` executable.
pub struct GitCloner {
    executable: PathBuf,
}

impl GitCloner {
    pub fn new(executable: PathBuf) -> Self {
        Self { executable }
    }
}

#[async_trait]
impl RepoCloner for GitCloner {
    #[instrument(skip(self, dest), fields(git = %self.executable.display()))]
    async fn clone_repo(&self, url: &str, dest: &Path) -> anyhow::Result<StageResult<String>> {
        let output = Command::new(&self.executable)
            .args(["clone", "--depth", "1", "--"])
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                return Ok(StageResult::Failure(format!(
                    "An unexpected error occurred during repository cloning: failed to run {}: {e}",
                    self.executable.display()
                )));
            }
        };

        if output.status.success() {
            debug!("clone finished");
            Ok(StageResult::Success("Repository cloned successfully.".to_string()))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Ok(StageResult::Failure(format!(
                "Error cloning repository: {} ({})",
                stderr.trim(),
                output.status
            )))
        }
    }
}
