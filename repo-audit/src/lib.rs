//! Clone a repository, review its files with a language model, build and
//! test it in a container, and summarize everything in one report.

pub mod analyzer;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod selector;
pub mod stage;
pub mod workspace;

pub use config::AuditConfig;
pub use pipeline::{AuditPipeline, AuditPipelineBuilder, AuditRun};
pub use stage::{Outcome, RunState, StageResult};

/// Audit `repo_url` with the default collaborators described by `config`.
///
/// Always returns a report; setup problems are reported in the text.
pub async fn run_audit(config: &AuditConfig, repo_url: &str) -> String {
    match AuditPipeline::from_config(config) {
        Ok(pipeline) => pipeline.run_audit(repo_url).await,
        Err(e) => format!("Starting analysis for: {repo_url}\n\nUnhandled error: {e:#}\n"),
    }
}
