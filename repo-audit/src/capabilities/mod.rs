//! External collaborators the audit pipeline drives.
//!
//! Every method returns `anyhow::Result`: `Ok(StageResult::Failure(..))` is a
//! declared failure the pipeline knows how to report, while `Err` is an
//! unexpected fault.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AuditConfig;
use crate::stage::StageResult;

pub mod docker;
pub mod git;
pub mod llm;

use docker::{DockerImageBuilder, DockerTestRunner, DockerfileGenerator};
use git::GitCloner;
use llm::ChatCompletionsAnalyzer;

#[async_trait]
pub trait RepoCloner: Send + Sync {
    /// Shallow-fetch `url` into the existing, empty directory `dest`.
    async fn clone_repo(&self, url: &str, dest: &Path) -> anyhow::Result<StageResult<String>>;
}

#[async_trait]
pub trait DescriptorGenerator: Send + Sync {
    /// Write a container build descriptor into `project_dir`.
    async fn generate(&self, project_dir: &Path) -> anyhow::Result<StageResult<String>>;
}

/// Result of an image build. Logs are kept whether or not the build passed.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub result: StageResult<String>,
    pub logs: String,
}

#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, project_dir: &Path, image_name: &str) -> anyhow::Result<BuildOutput>;
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Run the project's tests inside a container from `image_name`. Both
    /// variants carry the captured test output.
    async fn run_tests(
        &self,
        image_name: &str,
        project_dir: &Path,
    ) -> anyhow::Result<StageResult<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Review of a single source file.
    File,
    /// Final pass over the whole report.
    Synthesis,
}

#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    pub content: &'a str,
    pub label: &'a str,
    pub kind: RequestKind,
}

#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze_text(&self, request: AnalysisRequest<'_>)
    -> anyhow::Result<StageResult<String>>;
}

/// The default collaborator set, built from configuration.
pub struct Capabilities {
    pub cloner: Arc<dyn RepoCloner>,
    pub descriptor: Arc<dyn DescriptorGenerator>,
    pub builder: Arc<dyn ImageBuilder>,
    pub tester: Arc<dyn TestRunner>,
    pub analyzer: Arc<dyn TextAnalyzer>,
}

impl Capabilities {
    pub fn from_config(config: &AuditConfig) -> anyhow::Result<Self> {
        Ok(Self {
            cloner: Arc::new(GitCloner::new(config.git_executable.clone())),
            descriptor: Arc::new(DockerfileGenerator::new()),
            builder: Arc::new(DockerImageBuilder::new(config.container.clone())),
            tester: Arc::new(DockerTestRunner::new(config.container.clone())),
            analyzer: Arc::new(ChatCompletionsAnalyzer::new(config.analysis.clone())?),
        })
    }
}
