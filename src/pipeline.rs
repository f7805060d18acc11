//! Fixed-order pipeline engine with deadline degradation.
//!
//! A pipeline is a sequence of stages over a typed state record. Stages run
//! strictly in order; a stage whose output is already present in the state is
//! skipped, a stage that fails installs its own defaults, and when the run's
//! soft deadline expires the remaining stages are abandoned in favour of one
//! cheap fallback call. The engine itself never fails: every run yields a
//! structurally complete state plus a per-stage report.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::ProviderError;

/// Why a stage's oracle-backed work did not produce usable output.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Oracle(#[from] ProviderError),
    #[error("unusable oracle output: {0}")]
    Parse(String),
}

/// One step of a pipeline. `apply` mutates the state in place; on failure the
/// engine calls `apply_default` so the stage's keys are always set afterwards.
#[async_trait]
pub trait Stage<S: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when the stage's output is already present (pre-supplied by the
    /// caller or filled by an earlier run). Satisfied stages are skipped.
    fn is_satisfied(&self, _state: &S) -> bool {
        false
    }

    async fn apply(&self, state: &mut S, run_id: Uuid) -> Result<(), StageError>;

    /// Install this stage's minimal defaults. Must be cheap and infallible.
    fn apply_default(&self, state: &mut S);
}

/// Invoked at most once per run, when the deadline expires mid-pipeline.
/// `apply` should fill every still-unset key with one oracle call;
/// `fill_defaults` is the last resort when even that fails.
#[async_trait]
pub trait FallbackStage<S: Send>: Send + Sync {
    async fn apply(&self, state: &mut S, run_id: Uuid) -> Result<(), StageError>;

    fn fill_defaults(&self, state: &mut S);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Oracle-backed work succeeded.
    Applied,
    /// Work failed; stage defaults installed.
    Defaulted,
    /// Output was pre-supplied; stage not run.
    Skipped,
    /// Abandoned because the run deadline expired first.
    SkippedDeadline,
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: &'static str,
    pub status: StageStatus,
    pub error: Option<String>,
}

/// Overall quality of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every stage applied or was legitimately skipped.
    Complete,
    /// Some stage defaulted, or the run fell back to the quick path.
    Degraded,
    /// Even the fallback failed; hard-coded defaults fill the gaps.
    DegradedDefaults,
}

pub struct PipelineRun<S> {
    pub state: S,
    pub status: RunStatus,
    pub reports: Vec<StageReport>,
    pub fallback_invoked: bool,
    pub run_id: Uuid,
    pub elapsed: Duration,
}

pub struct PipelineEngine<S> {
    name: &'static str,
    stages: Vec<Box<dyn Stage<S>>>,
    fallback: Box<dyn FallbackStage<S>>,
    deadline: Duration,
}

impl<S: Send> PipelineEngine<S> {
    pub fn new(
        name: &'static str,
        stages: Vec<Box<dyn Stage<S>>>,
        fallback: Box<dyn FallbackStage<S>>,
        deadline: Duration,
    ) -> Self {
        Self {
            name,
            stages,
            fallback,
            deadline,
        }
    }

    /// Run the pipeline to completion. The deadline is soft: it is checked
    /// between stages only, and an in-flight stage call is bounded by its own
    /// request budget rather than preempted.
    pub async fn run(&self, mut state: S) -> PipelineRun<S> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut reports = Vec::with_capacity(self.stages.len());
        let mut any_defaulted = false;
        let mut fallback_invoked = false;
        let mut fallback_failed = false;

        let mut stages = self.stages.iter();
        while let Some(stage) = stages.next() {
            if started.elapsed() >= self.deadline {
                warn!(
                    pipeline = self.name,
                    %run_id,
                    stage = stage.name(),
                    "deadline expired, switching to fallback"
                );
                reports.push(StageReport {
                    name: stage.name(),
                    status: StageStatus::SkippedDeadline,
                    error: None,
                });
                for remaining in stages.by_ref() {
                    reports.push(StageReport {
                        name: remaining.name(),
                        status: StageStatus::SkippedDeadline,
                        error: None,
                    });
                }
                fallback_invoked = true;
                if let Err(e) = self.fallback.apply(&mut state, run_id).await {
                    warn!(pipeline = self.name, %run_id, error = %e, "fallback failed, installing defaults");
                    self.fallback.fill_defaults(&mut state);
                    fallback_failed = true;
                }
                break;
            }

            if stage.is_satisfied(&state) {
                reports.push(StageReport {
                    name: stage.name(),
                    status: StageStatus::Skipped,
                    error: None,
                });
                continue;
            }

            match stage.apply(&mut state, run_id).await {
                Ok(()) => reports.push(StageReport {
                    name: stage.name(),
                    status: StageStatus::Applied,
                    error: None,
                }),
                Err(e) => {
                    warn!(
                        pipeline = self.name,
                        %run_id,
                        stage = stage.name(),
                        error = %e,
                        "stage failed, installing stage defaults"
                    );
                    stage.apply_default(&mut state);
                    any_defaulted = true;
                    reports.push(StageReport {
                        name: stage.name(),
                        status: StageStatus::Defaulted,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let status = if fallback_failed {
            RunStatus::DegradedDefaults
        } else if fallback_invoked || any_defaulted {
            RunStatus::Degraded
        } else {
            RunStatus::Complete
        };
        let elapsed = started.elapsed();
        info!(
            pipeline = self.name,
            %run_id,
            ?status,
            elapsed_ms = elapsed.as_millis() as u64,
            "pipeline run finished"
        );

        PipelineRun {
            state,
            status,
            reports,
            fallback_invoked,
            run_id,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        fallback_calls: AtomicUsize,
    }

    #[derive(Default)]
    struct TestState {
        a: Option<u32>,
        b: Option<u32>,
        c: Option<u32>,
    }

    struct SetStage {
        name: &'static str,
        field: fn(&mut TestState) -> &mut Option<u32>,
        probe: fn(&TestState) -> bool,
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl Stage<TestState> for SetStage {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_satisfied(&self, state: &TestState) -> bool {
            (self.probe)(state)
        }

        async fn apply(&self, state: &mut TestState, _run_id: Uuid) -> Result<(), StageError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(StageError::Parse("bad output".into()));
            }
            *(self.field)(state) = Some(1);
            Ok(())
        }

        fn apply_default(&self, state: &mut TestState) {
            *(self.field)(state) = Some(0);
        }
    }

    struct TestFallback {
        counters: Arc<Counters>,
        fail: bool,
    }

    #[async_trait]
    impl FallbackStage<TestState> for TestFallback {
        async fn apply(&self, state: &mut TestState, _run_id: Uuid) -> Result<(), StageError> {
            self.counters.fallback_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StageError::Parse("fallback bad".into()));
            }
            state.a.get_or_insert(9);
            state.b.get_or_insert(9);
            state.c.get_or_insert(9);
            Ok(())
        }

        fn fill_defaults(&self, state: &mut TestState) {
            state.a.get_or_insert(0);
            state.b.get_or_insert(0);
            state.c.get_or_insert(0);
        }
    }

    fn stage(
        name: &'static str,
        field: fn(&mut TestState) -> &mut Option<u32>,
        probe: fn(&TestState) -> bool,
        fail: bool,
        delay: Duration,
    ) -> Box<dyn Stage<TestState>> {
        Box::new(SetStage {
            name,
            field,
            probe,
            fail,
            delay,
        })
    }

    fn engine(
        stages: Vec<Box<dyn Stage<TestState>>>,
        counters: Arc<Counters>,
        fallback_fails: bool,
        deadline: Duration,
    ) -> PipelineEngine<TestState> {
        PipelineEngine::new(
            "test",
            stages,
            Box::new(TestFallback {
                counters,
                fail: fallback_fails,
            }),
            deadline,
        )
    }

    #[tokio::test]
    async fn clean_run_is_complete() {
        let counters = Arc::new(Counters::default());
        let e = engine(
            vec![
                stage("a", |s| &mut s.a, |s| s.a.is_some(), false, Duration::ZERO),
                stage("b", |s| &mut s.b, |s| s.b.is_some(), false, Duration::ZERO),
            ],
            Arc::clone(&counters),
            false,
            Duration::from_secs(60),
        );
        let run = e.run(TestState::default()).await;
        assert_eq!(run.status, RunStatus::Complete);
        assert!(run.reports.iter().all(|r| r.status == StageStatus::Applied));
        assert_eq!(counters.fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_stage_defaults_and_run_continues() {
        let counters = Arc::new(Counters::default());
        let e = engine(
            vec![
                stage("a", |s| &mut s.a, |s| s.a.is_some(), true, Duration::ZERO),
                stage("b", |s| &mut s.b, |s| s.b.is_some(), false, Duration::ZERO),
            ],
            Arc::clone(&counters),
            false,
            Duration::from_secs(60),
        );
        let run = e.run(TestState::default()).await;
        assert_eq!(run.status, RunStatus::Degraded);
        assert_eq!(run.state.a, Some(0));
        assert_eq!(run.state.b, Some(1));
        assert_eq!(run.reports[0].status, StageStatus::Defaulted);
        assert!(run.reports[0].error.is_some());
        assert_eq!(run.reports[1].status, StageStatus::Applied);
    }

    #[tokio::test]
    async fn presupplied_output_skips_stage() {
        let counters = Arc::new(Counters::default());
        let e = engine(
            vec![
                stage("a", |s| &mut s.a, |s| s.a.is_some(), true, Duration::ZERO),
                stage("b", |s| &mut s.b, |s| s.b.is_some(), false, Duration::ZERO),
            ],
            Arc::clone(&counters),
            false,
            Duration::from_secs(60),
        );
        let run = e
            .run(TestState {
                a: Some(42),
                ..Default::default()
            })
            .await;
        // Stage "a" would fail if run; skipping keeps the run Complete and
        // the pre-supplied value untouched.
        assert_eq!(run.status, RunStatus::Complete);
        assert_eq!(run.state.a, Some(42));
        assert_eq!(run.reports[0].status, StageStatus::Skipped);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_triggers_fallback_exactly_once() {
        let counters = Arc::new(Counters::default());
        let e = engine(
            vec![
                stage("a", |s| &mut s.a, |s| s.a.is_some(), false, Duration::from_secs(300)),
                stage("b", |s| &mut s.b, |s| s.b.is_some(), false, Duration::ZERO),
                stage("c", |s| &mut s.c, |s| s.c.is_some(), false, Duration::ZERO),
            ],
            Arc::clone(&counters),
            false,
            Duration::from_secs(240),
        );
        let run = e.run(TestState::default()).await;
        assert!(run.fallback_invoked);
        assert_eq!(counters.fallback_calls.load(Ordering::SeqCst), 1);
        assert_eq!(run.status, RunStatus::Degraded);
        // First stage ran to completion (never preempted), the rest were
        // abandoned and the fallback filled them.
        assert_eq!(run.state.a, Some(1));
        assert_eq!(run.state.b, Some(9));
        assert_eq!(run.state.c, Some(9));
        assert_eq!(run.reports[1].status, StageStatus::SkippedDeadline);
        assert_eq!(run.reports[2].status, StageStatus::SkippedDeadline);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_failure_installs_hard_defaults() {
        let counters = Arc::new(Counters::default());
        let e = engine(
            vec![
                stage("a", |s| &mut s.a, |s| s.a.is_some(), false, Duration::from_secs(300)),
                stage("b", |s| &mut s.b, |s| s.b.is_some(), false, Duration::ZERO),
            ],
            Arc::clone(&counters),
            true,
            Duration::from_secs(240),
        );
        let run = e.run(TestState::default()).await;
        assert_eq!(run.status, RunStatus::DegradedDefaults);
        assert_eq!(run.state.b, Some(0));
        assert!(run.state.a.is_some());
        assert!(run.state.c.is_some());
    }
}
