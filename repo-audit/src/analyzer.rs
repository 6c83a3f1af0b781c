use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::capabilities::{AnalysisRequest, RequestKind, TextAnalyzer};
use crate::error::PerFileError;
use crate::selector::FileCandidate;
use crate::stage::StageResult;

pub const NO_FILES_FRAGMENT: &str =
    "No suitable code files found for LLM analysis or all files skipped.\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Analyzed(String),
    AnalysisFailed(String),
    ReadFailed(String),
}

impl AnalysisOutcome {
    fn text(&self) -> String {
        match self {
            AnalysisOutcome::Analyzed(text) => text.clone(),
            AnalysisOutcome::AnalysisFailed(reason) => format!("Error analyzing: {reason}"),
            AnalysisOutcome::ReadFailed(reason) => format!("Could not read file: {reason}"),
        }
    }
}

impl From<PerFileError> for AnalysisOutcome {
    fn from(err: PerFileError) -> Self {
        match err {
            PerFileError::Read(e) => AnalysisOutcome::ReadFailed(e.to_string()),
            PerFileError::Analysis(reason) => AnalysisOutcome::AnalysisFailed(reason),
        }
    }
}

/// Analysis result for one candidate, ready to become a report fragment.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub candidate: FileCandidate,
    pub outcome: AnalysisOutcome,
}

impl FileReport {
    pub fn fragment(&self) -> String {
        format!(
            "File: {}\n{}\n",
            self.candidate.relative.display(),
            self.outcome.text()
        )
    }
}

async fn review(
    analyzer: &dyn TextAnalyzer,
    candidate: &FileCandidate,
) -> Result<String, PerFileError> {
    let bytes = tokio::fs::read(&candidate.absolute).await?;
    let content = String::from_utf8_lossy(&bytes);
    let label = candidate.relative.to_string_lossy();

    let request = AnalysisRequest {
        content: &content,
        label: &label,
        kind: RequestKind::File,
    };
    match analyzer.analyze_text(request).await {
        Ok(StageResult::Success(text)) => Ok(text),
        Ok(StageResult::Failure(reason)) => Err(PerFileError::Analysis(reason)),
        Err(e) => Err(PerFileError::Analysis(format!("{e:#}"))),
    }
}

/// Read one candidate and send it for review. Never fails: every problem is
/// folded into the returned outcome.
#[instrument(skip(analyzer, candidate), fields(path = %candidate.relative.display()))]
pub async fn analyze(analyzer: &dyn TextAnalyzer, candidate: &FileCandidate) -> AnalysisOutcome {
    match review(analyzer, candidate).await {
        Ok(text) => AnalysisOutcome::Analyzed(text),
        Err(e) => {
            warn!(error = %e, "file analysis failed");
            e.into()
        }
    }
}

/// Analyze every candidate with at most `max_concurrency` calls in flight.
/// Results come back in the order the candidates were yielded.
pub async fn analyze_all(
    analyzer: Arc<dyn TextAnalyzer>,
    candidates: impl IntoIterator<Item = FileCandidate>,
    max_concurrency: usize,
) -> Vec<FileReport> {
    let sem = Arc::new(Semaphore::new(max_concurrency.max(1)));

    let futures: Vec<_> = candidates
        .into_iter()
        .map(|candidate| {
            let sem = sem.clone();
            let analyzer = analyzer.clone();
            async move {
                // the semaphore lives as long as this function and is never closed
                let _permit = sem.acquire().await.ok();
                let outcome = analyze(analyzer.as_ref(), &candidate).await;
                FileReport { candidate, outcome }
            }
        })
        .collect();

    debug!(count = futures.len(), "analyzing candidates");
    join_all(futures).await
}
