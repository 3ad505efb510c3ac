//! Stage events emitted along the prepare/settle pipeline.
//!
//! Components report what happened through an injected [`SettlementObserver`] instead of
//! logging directly, so the polling and race logic can be asserted on in tests.

use std::fmt::{Display, Formatter};
use x402_types::util::TraceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Classify,
    Prepare,
    Verify,
    Sign,
    Submit,
    Confirm,
    Simulate,
    RegisterJob,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Prepare => "prepare",
            Stage::Verify => "verify",
            Stage::Sign => "sign",
            Stage::Submit => "submit",
            Stage::Confirm => "confirm",
            Stage::Simulate => "simulate",
            Stage::RegisterJob => "register_job",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// Finished with a detail worth recording, e.g. a signature or a classification.
    Info(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEvent {
    pub trace_id: TraceId,
    pub stage: Stage,
    pub outcome: Outcome,
}

impl StageEvent {
    pub fn new(trace_id: &TraceId, stage: Stage, outcome: Outcome) -> Self {
        Self {
            trace_id: trace_id.clone(),
            stage,
            outcome,
        }
    }
}

pub trait SettlementObserver: Send + Sync {
    fn on_event(&self, event: StageEvent);
}

/// Forwards stage events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SettlementObserver for TracingObserver {
    fn on_event(&self, event: StageEvent) {
        let trace_id = event.trace_id.as_str();
        let stage = event.stage.as_str();
        match event.outcome {
            Outcome::Ok => tracing::debug!(trace_id, stage, "ok"),
            Outcome::Info(detail) => tracing::info!(trace_id, stage, detail = %detail, "ok"),
            Outcome::Failed(reason) => tracing::warn!(trace_id, stage, reason = %reason, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingObserver;

    #[test]
    fn test_events_keep_order_and_trace_id() {
        let observer = RecordingObserver::default();
        let trace_id = TraceId::new();
        observer.on_event(StageEvent::new(&trace_id, Stage::Submit, Outcome::Ok));
        observer.on_event(StageEvent::new(
            &trace_id,
            Stage::Confirm,
            Outcome::Failed("expired".into()),
        ));
        assert_eq!(observer.stages(), vec![Stage::Submit, Stage::Confirm]);
        assert!(observer.events().iter().all(|e| e.trace_id == trace_id));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::RegisterJob.to_string(), "register_job");
        assert_eq!(Stage::Classify.as_str(), "classify");
    }
}
