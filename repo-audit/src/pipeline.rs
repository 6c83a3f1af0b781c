use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use futures::FutureExt;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::analyzer::{self, NO_FILES_FRAGMENT};
use crate::capabilities::{AnalysisRequest, BuildOutput, Capabilities, RequestKind};
use crate::config::AuditConfig;
use crate::error::{StageFailure, UnhandledFault};
use crate::report::Report;
use crate::selector;
use crate::stage::{Outcome, RunState, StageResult};
use crate::workspace::Workspace;

pub const SYNTHESIS_LABEL: &str = "Final Report Synthesis";

/// Everything a finished run leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRun {
    pub repo_url: String,
    pub report: String,
    /// `Done` for a clean run, otherwise the last state reached before the
    /// abort.
    pub reached: RunState,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<StageFailure>,
}

/// Mutable state of one run while the stages execute.
struct RunContext {
    repo_url: String,
    report: Report,
    reached: RunState,
    abort: Option<StageFailure>,
}

impl RunContext {
    fn new(repo_url: &str) -> Self {
        Self {
            repo_url: repo_url.to_string(),
            report: Report::new(),
            reached: RunState::Start,
            abort: None,
        }
    }

    fn advance(&mut self, state: RunState) {
        info!(repo = %self.repo_url, stage = %state, "stage reached");
        self.reached = state;
    }

    fn abort(&mut self, stage: RunState, message: impl Into<String>) {
        let failure = StageFailure {
            stage,
            message: message.into(),
        };
        warn!(repo = %self.repo_url, error = %failure, "run aborted");
        self.abort = Some(failure);
    }

    fn finish(mut self) -> AuditRun {
        let outcome = if self.abort.is_some() {
            Outcome::Aborted
        } else {
            self.advance(RunState::Done);
            Outcome::Done
        };
        AuditRun {
            repo_url: self.repo_url,
            report: self.report.render(),
            reached: self.reached,
            outcome,
            abort: self.abort,
        }
    }
}

/// State a run would move to after `state`, used to name the stage that
/// was in progress when a fault hit.
fn next_state(state: RunState) -> RunState {
    match state {
        RunState::Start => RunState::WorkspaceAcquired,
        RunState::WorkspaceAcquired => RunState::Cloned,
        RunState::Cloned => RunState::Analyzed,
        RunState::Analyzed => RunState::Dockerfiled,
        RunState::Dockerfiled => RunState::ImageBuilt,
        RunState::ImageBuilt => RunState::Tested,
        RunState::Tested => RunState::Synthesized,
        RunState::Synthesized | RunState::Done => RunState::Done,
    }
}

pub fn image_name(workspace: &Workspace) -> String {
    format!("audited-{}", workspace.id().to_lowercase())
}

pub fn synthesis_prompt(report: &str) -> String {
    format!(
        "Based on the following analysis report, synthesize a comprehensive summary for a human audience.\n\
         Explain the overall findings, highlight key issues, successful steps, and provide actionable recommendations.\n\
         Report:\n\
         ```\n\
         {report}\n\
         ```\n"
    )
}

/// Drives one repository through clone, analysis, containerization, tests
/// and a final summary.
pub struct AuditPipeline {
    capabilities: Capabilities,
    workspace_root: PathBuf,
    max_concurrency: usize,
}

impl AuditPipeline {
    pub fn builder(capabilities: Capabilities) -> AuditPipelineBuilder {
        AuditPipelineBuilder::new(capabilities)
    }

    /// Pipeline wired with the default git, docker and chat-completions
    /// collaborators.
    pub fn from_config(config: &AuditConfig) -> anyhow::Result<Self> {
        Ok(AuditPipelineBuilder::new(Capabilities::from_config(config)?)
            .workspace_root(config.workspace_root())
            .max_concurrency(config.max_concurrency)
            .build())
    }

    /// Run a full audit and return only the report text.
    pub async fn run_audit(&self, repo_url: &str) -> String {
        self.run(repo_url).await.report
    }

    /// Run a full audit. Never fails: every problem ends up in the report.
    #[instrument(skip(self), fields(workspace_root = %self.workspace_root.display()))]
    pub async fn run(&self, repo_url: &str) -> AuditRun {
        let mut ctx = RunContext::new(repo_url);
        ctx.report.append(format!("Starting analysis for: {repo_url}\n"));

        let mut workspace = match Workspace::acquire(&self.workspace_root) {
            Ok(ws) => ws,
            Err(e) => {
                ctx.report
                    .append(format!("Failed to create temporary directory: {e}\n"));
                ctx.abort(RunState::WorkspaceAcquired, e.to_string());
                return ctx.finish();
            }
        };
        ctx.advance(RunState::WorkspaceAcquired);
        ctx.report.append(format!(
            "Temporary directory created at: {}\n",
            workspace.path().display()
        ));

        let stages = AssertUnwindSafe(self.run_stages(&mut ctx, &workspace))
            .catch_unwind()
            .await;
        let fault = match stages {
            Ok(Ok(())) => None,
            Ok(Err(fault)) => Some(fault),
            Err(payload) => Some(UnhandledFault::from_panic(payload)),
        };
        if let Some(fault) = fault {
            ctx.report.append(format!("\nUnhandled error: {fault}\n"));
            let stage = next_state(ctx.reached);
            ctx.abort(stage, fault.to_string());
        }

        let path = workspace.path().display().to_string();
        match workspace.release() {
            Ok(()) => ctx
                .report
                .append(format!("\nCleaned up temporary directory: {path}\n")),
            Err(e) => ctx
                .report
                .append(format!("\nFailed to clean up temporary directory {path}: {e}\n")),
        }

        ctx.finish()
    }

    async fn run_stages(
        &self,
        ctx: &mut RunContext,
        workspace: &Workspace,
    ) -> Result<(), UnhandledFault> {
        let caps = &self.capabilities;
        let dir = workspace.path();

        // Clone
        let cloned = caps.cloner.clone_repo(&ctx.repo_url, dir).await?;
        match cloned {
            StageResult::Success(msg) => {
                ctx.report
                    .append(format!("Repository Cloning: SUCCESS - {msg}\n"));
                ctx.advance(RunState::Cloned);
            }
            StageResult::Failure(msg) => {
                ctx.report.append(format!("Repository Cloning: FAILED - {msg}\n"));
                ctx.abort(RunState::Cloned, msg);
                return Ok(());
            }
        }

        // Per-file analysis
        ctx.report.append("\n--- AI Code Analysis ---\n");
        let candidates = selector::select(dir);
        let files =
            analyzer::analyze_all(caps.analyzer.clone(), candidates, self.max_concurrency).await;
        if files.is_empty() {
            ctx.report.append(NO_FILES_FRAGMENT);
        }
        for file in &files {
            ctx.report.append(file.fragment());
        }
        ctx.advance(RunState::Analyzed);

        // Dockerfile
        ctx.report.append("\n--- Dockerization ---\n");
        let descriptor = caps.descriptor.generate(dir).await?;
        match descriptor {
            StageResult::Success(msg) => {
                ctx.report
                    .append(format!("Dockerfile Generation: SUCCESS - {msg}\n"));
                ctx.advance(RunState::Dockerfiled);
            }
            StageResult::Failure(msg) => {
                ctx.report
                    .append(format!("Dockerfile Generation: FAILED - {msg}\n"));
                ctx.abort(RunState::Dockerfiled, msg);
                return Ok(());
            }
        }

        // Image build
        let image = image_name(workspace);
        let BuildOutput { result, logs } = caps.builder.build(dir, &image).await?;
        match &result {
            StageResult::Success(_) => ctx.report.append("Docker Image Build: SUCCESS\n"),
            StageResult::Failure(msg) => ctx
                .report
                .append(format!("Docker Image Build: FAILED - {msg}\n")),
        }
        ctx.report.append(format!("Build Logs:\n{logs}\n"));
        match result {
            StageResult::Success(tag) => {
                ctx.report.append(format!("Image Tag: {tag}\n"));
                ctx.advance(RunState::ImageBuilt);
            }
            StageResult::Failure(msg) => {
                ctx.abort(RunState::ImageBuilt, msg);
                return Ok(());
            }
        }

        // Tests: a failing suite is a finding, not a reason to stop
        ctx.report.append("\n--- Automated Testing ---\n");
        let tests = caps.tester.run_tests(&image, dir).await?;
        ctx.report
            .append(format!("Test Execution: {}\n", tests.status_label()));
        let results = match tests {
            StageResult::Success(text) | StageResult::Failure(text) => text,
        };
        ctx.report.append(format!("Test Results:\n{results}\n"));
        ctx.advance(RunState::Tested);

        // Synthesis
        ctx.report
            .append("\n--- Final AI Summary and Recommendations ---\n");
        let prompt = synthesis_prompt(&ctx.report.contents());
        let summary = caps
            .analyzer
            .analyze_text(AnalysisRequest {
                content: &prompt,
                label: SYNTHESIS_LABEL,
                kind: RequestKind::Synthesis,
            })
            .await;
        // best-effort: no synthesis problem ends the run
        match summary {
            Ok(StageResult::Success(mut text)) => {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                ctx.report.append(text);
            }
            Ok(StageResult::Failure(msg)) => ctx
                .report
                .append(format!("Could not generate final AI explanation: {msg}\n")),
            Err(e) => {
                warn!(error = %e, "synthesis request failed");
                ctx.report
                    .append(format!("Could not generate final AI explanation: {e:#}\n"));
            }
        }
        ctx.advance(RunState::Synthesized);

        Ok(())
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }
}

pub struct AuditPipelineBuilder {
    capabilities: Capabilities,
    workspace_root: Option<PathBuf>,
    max_concurrency: usize,
}

impl AuditPipelineBuilder {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            workspace_root: None,
            max_concurrency: 4,
        }
    }

    pub fn workspace_root(mut self, root: PathBuf) -> Self {
        self.workspace_root = Some(root);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn build(self) -> AuditPipeline {
        AuditPipeline {
            capabilities: self.capabilities,
            workspace_root: self.workspace_root.unwrap_or_else(std::env::temp_dir),
            max_concurrency: self.max_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_state_walks_forward() {
        assert_eq!(next_state(RunState::WorkspaceAcquired), RunState::Cloned);
        assert_eq!(next_state(RunState::ImageBuilt), RunState::Tested);
        assert_eq!(next_state(RunState::Synthesized), RunState::Done);
    }

    #[test]
    fn image_name_is_lowercased_workspace_id() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::acquire(root.path()).unwrap();
        let name = image_name(&ws);
        assert_eq!(name, format!("audited-{}", ws.id().to_lowercase()));
        assert_eq!(name, name.to_lowercase());
    }

    #[test]
    fn synthesis_prompt_embeds_report() {
        let prompt = synthesis_prompt("Test Execution: FAILED\n");
        assert!(prompt.starts_with("Based on the following analysis report"));
        assert!(prompt.contains("```\nTest Execution: FAILED\n\n```"));
    }

    #[test]
    fn builder_defaults() {
        let pipeline = AuditPipeline::from_config(&AuditConfig::default()).unwrap();
        assert_eq!(pipeline.max_concurrency(), 4);
        assert_eq!(pipeline.workspace_root, std::env::temp_dir());
    }

    #[test]
    fn builder_clamps_zero_concurrency() {
        let caps = Capabilities::from_config(&AuditConfig::default()).unwrap();
        let pipeline = AuditPipeline::builder(caps).max_concurrency(0).build();
        assert_eq!(pipeline.max_concurrency(), 1);
    }

    #[test]
    fn finish_without_abort_is_done() {
        let mut ctx = RunContext::new("https://example.com/r.git");
        ctx.report.append("x\n");
        ctx.advance(RunState::Synthesized);
        let run = ctx.finish();
        assert_eq!(run.outcome, Outcome::Done);
        assert_eq!(run.reached, RunState::Done);
        assert_eq!(run.report, "x\n");
    }

    #[test]
    fn finish_with_abort_is_aborted() {
        let mut ctx = RunContext::new("https://example.com/r.git");
        ctx.advance(RunState::WorkspaceAcquired);
        ctx.abort(RunState::Cloned, "not found");
        let run = ctx.finish();
        assert_eq!(run.outcome, Outcome::Aborted);
        assert_eq!(run.reached, RunState::WorkspaceAcquired);
        assert_eq!(run.abort.unwrap().stage, RunState::Cloned);
    }
}
