#![forbid(unsafe_code)]

//! # screenflow
//!
//! Multi-stage analysis pipelines and bounded-concurrency batch scoring on top
//! of an unreliable text-generation oracle.
//!
//! The oracle is slow, occasionally unavailable, and frequently sloppy about
//! output shape. screenflow's job is to make complete, well-formed result sets
//! out of it anyway:
//!
//! - [`batch`] fans a long work list into capped-concurrency groups, one
//!   oracle call per group, and repairs each response against the group's
//!   expected identifiers so output cardinality always matches input.
//! - [`pipeline`] runs a fixed-order stage sequence against a typed state
//!   record, substituting stage-local defaults on failure and degrading to a
//!   single-call fallback when the run deadline expires.
//! - [`prep`] and [`decision`] are the two shipped pipelines: interview
//!   preparation and the five-factor hiring recommendation.
//!
//! Every oracle-facing seam is a trait ([`gateway::ChatGateway`],
//! [`search::SearchProvider`], [`gateway::UsageSink`]) so tests run against
//! deterministic fakes.

pub mod batch;
pub mod decision;
pub mod gateway;
pub mod pipeline;
pub mod prep;
pub mod prompts;
pub mod repair;
pub mod search;

pub use batch::{score_batch, BatchOptions, BatchScoreOutcome, Profile, WorkItem};
pub use decision::{recommend, DecisionInput, DecisionLabel, DecisionOutcome, DecisionRecord};
pub use gateway::{Attribution, ChatGateway, NoopUsageSink, OracleGateway, UsageSink};
pub use pipeline::{
    FallbackStage, PipelineEngine, PipelineRun, RunStatus, Stage, StageError, StageReport,
    StageStatus,
};
pub use prep::{prepare_interview, PrepOptions, PrepState, RoleLevel};
pub use repair::{repair, Recommendation, ScoreResult};
pub use search::{NoopSearchProvider, SearchHit, SearchProvider};
