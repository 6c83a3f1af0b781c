use std::fmt;

use serde::Serialize;

/// Position of a run in the audit state machine.
///
/// States are ordered and a run only ever moves forward. A clean run ends in
/// [`RunState::Done`]; an aborted one stays at the last state it reached and
/// reports [`Outcome::Aborted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RunState {
    Start,
    WorkspaceAcquired,
    Cloned,
    Analyzed,
    Dockerfiled,
    ImageBuilt,
    Tested,
    Synthesized,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Start => "Start",
            RunState::WorkspaceAcquired => "WorkspaceAcquired",
            RunState::Cloned => "Cloned",
            RunState::Analyzed => "Analyzed",
            RunState::Dockerfiled => "Dockerfiled",
            RunState::ImageBuilt => "ImageBuilt",
            RunState::Tested => "Tested",
            RunState::Synthesized => "Synthesized",
            RunState::Done => "Done",
        };
        f.write_str(name)
    }
}

/// Declared outcome of one stage or capability call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult<T> {
    Success(T),
    Failure(String),
}

impl<T> StageResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success(_))
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_success() { "SUCCESS" } else { "FAILED" }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Done,
    Aborted,
}
