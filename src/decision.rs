//! Hiring-decision aggregator.
//!
//! Five stages over a [`DecisionState`]: ATS keyword analysis and project
//! relevance (both skipped when the caller pre-supplies their results),
//! college-tier lookup, experience evaluation, and the terminal decision
//! maker that synthesizes everything into a [`DecisionRecord`]. Runs on the
//! same engine as interview prep, so stage failures degrade to defaults and
//! the outcome always carries a record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::batch::{Profile, ProjectEntry};
use crate::gateway::{Attribution, ChatGateway, ChatRequest};
use crate::pipeline::{FallbackStage, PipelineEngine, RunStatus, Stage, StageError};
use crate::prompts;
use crate::repair::{clamp_score, extract_json};
use crate::search::SearchProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtsAnalysis {
    pub score: u8,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub missing_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRelevance {
    pub name: String,
    #[serde(rename = "relevanceScore", alias = "relevance_score")]
    pub relevance_score: u8,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAnalysis {
    pub projects: Vec<ProjectRelevance>,
    /// Mean relevance of the top three projects.
    pub project_score: u8,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollegeTierInfo {
    pub tier: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceEval {
    pub score: u8,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionLabel {
    #[serde(rename = "Strong Accept")]
    StrongAccept,
    #[serde(rename = "Accept")]
    Accept,
    #[serde(rename = "Consider")]
    Consider,
    #[serde(rename = "Reject")]
    Reject,
}

impl DecisionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrongAccept => "Strong Accept",
            Self::Accept => "Accept",
            Self::Consider => "Consider",
            Self::Reject => "Reject",
        }
    }
}

/// The final recommendation handed back to the recruiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub recommendation: DecisionLabel,
    pub confidence: u8,
    pub reasoning: String,
    #[serde(default)]
    pub key_factors: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub suggestion: String,
}

impl DecisionRecord {
    /// Low-confidence stand-in when every analysis path failed.
    pub fn inconclusive() -> Self {
        Self {
            recommendation: DecisionLabel::Consider,
            confidence: 20,
            reasoning: "Automated analysis was unavailable; no reliable signal either way."
                .to_string(),
            key_factors: Vec::new(),
            strengths: Vec::new(),
            concerns: vec!["Analysis incomplete".to_string()],
            suggestion: "Review this candidate manually.".to_string(),
        }
    }
}

/// Everything the caller knows about the candidate and the opening.
/// Pre-supplied analyses short-circuit their stages.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionInput {
    pub profile: Profile,
    #[serde(default)]
    pub resume_text: String,
    pub job_title: String,
    #[serde(default)]
    pub company: String,
    pub job_description: String,
    #[serde(default)]
    pub college: Option<String>,
    #[serde(default)]
    pub experience_years: f32,
    #[serde(default)]
    pub ats: Option<AtsAnalysis>,
    #[serde(default)]
    pub projects: Option<ProjectAnalysis>,
}

#[derive(Debug, Clone)]
pub struct DecisionState {
    pub input: DecisionInput,
    pub ats_analysis: Option<AtsAnalysis>,
    pub project_analysis: Option<ProjectAnalysis>,
    pub college_tier: Option<CollegeTierInfo>,
    pub experience_eval: Option<ExperienceEval>,
    pub decision: Option<DecisionRecord>,
}

impl DecisionState {
    fn new(input: DecisionInput) -> Self {
        let ats_analysis = input.ats.clone();
        let project_analysis = input.projects.clone();
        Self {
            input,
            ats_analysis,
            project_analysis,
            college_tier: None,
            experience_eval: None,
            decision: None,
        }
    }

    /// Per-stage results as one JSON object, pre-supplied values included
    /// unchanged. Feeds the decision prompt and the outcome echo.
    fn analysis_json(&self) -> Value {
        json!({
            "ats_analysis": self.ats_analysis,
            "project_analysis": self.project_analysis,
            "college_tier": self.college_tier,
            "experience_eval": self.experience_eval,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DecisionOptions {
    pub model: String,
    pub deadline: Duration,
    pub call_timeout: Duration,
}

impl Default for DecisionOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            deadline: Duration::from_secs(240),
            call_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub record: DecisionRecord,
    /// Echo of every per-stage analysis, pre-supplied values unchanged.
    pub analysis: Value,
    #[serde(skip)]
    pub status: RunStatus,
}

/// Mean relevance of the top three projects, rounded.
pub fn project_score(projects: &[ProjectRelevance]) -> u8 {
    if projects.is_empty() {
        return 0;
    }
    let mut scores: Vec<u8> = projects.iter().map(|p| p.relevance_score).collect();
    scores.sort_unstable_by(|a, b| b.cmp(a));
    scores.truncate(3);
    let sum: u32 = scores.iter().map(|&s| u32::from(s)).sum();
    (sum as f64 / scores.len() as f64).round() as u8
}

async fn oracle_json(
    gateway: &Arc<dyn ChatGateway>,
    model: &str,
    messages: Vec<crate::gateway::Message>,
    caller: &'static str,
    timeout: Duration,
    run_id: Uuid,
) -> Result<Value, StageError> {
    let request = ChatRequest::new(model, messages, Attribution::for_run(caller, run_id))
        .with_json_mode()
        .with_time_budget(timeout);
    let response = gateway.chat(request).await?;
    extract_json(&response.content)
        .ok_or_else(|| StageError::Parse("no JSON in oracle output".to_string()))
}

struct AtsAnalyzer {
    gateway: Arc<dyn ChatGateway>,
    options: DecisionOptions,
}

#[async_trait]
impl Stage<DecisionState> for AtsAnalyzer {
    fn name(&self) -> &'static str {
        "ats_analyzer"
    }

    fn is_satisfied(&self, state: &DecisionState) -> bool {
        state.ats_analysis.is_some()
    }

    async fn apply(&self, state: &mut DecisionState, run_id: Uuid) -> Result<(), StageError> {
        let resume = if state.input.resume_text.is_empty() {
            crate::batch::profile_summary(&state.input.profile)
        } else {
            state.input.resume_text.clone()
        };
        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::ats_analysis(&resume, &state.input.job_description),
            "decision.ats",
            self.options.call_timeout,
            run_id,
        )
        .await?;

        let score = payload
            .get("score")
            .map(clamp_score)
            .ok_or_else(|| StageError::Parse("missing ats score".to_string()))?;
        state.ats_analysis = Some(AtsAnalysis {
            score,
            summary: payload
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            missing_keywords: payload
                .get("missing_keywords")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        });
        Ok(())
    }

    fn apply_default(&self, state: &mut DecisionState) {
        state.ats_analysis.get_or_insert(AtsAnalysis {
            score: 0,
            summary: "ATS analysis unavailable".to_string(),
            missing_keywords: Vec::new(),
        });
    }
}

struct ProjectAnalyzer {
    gateway: Arc<dyn ChatGateway>,
    options: DecisionOptions,
}

fn project_inputs(projects: &[ProjectEntry]) -> String {
    serde_json::to_string(projects).unwrap_or_else(|_| "[]".to_string())
}

#[async_trait]
impl Stage<DecisionState> for ProjectAnalyzer {
    fn name(&self) -> &'static str {
        "project_analyzer"
    }

    fn is_satisfied(&self, state: &DecisionState) -> bool {
        state.project_analysis.is_some()
    }

    async fn apply(&self, state: &mut DecisionState, run_id: Uuid) -> Result<(), StageError> {
        if state.input.profile.projects.is_empty() {
            state.project_analysis = Some(ProjectAnalysis {
                projects: Vec::new(),
                project_score: 0,
                summary: "No projects listed".to_string(),
            });
            return Ok(());
        }

        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::project_relevance(
                &project_inputs(&state.input.profile.projects),
                &state.input.job_description,
            ),
            "decision.projects",
            self.options.call_timeout,
            run_id,
        )
        .await?;

        let raw = payload
            .get("projects")
            .and_then(Value::as_array)
            .ok_or_else(|| StageError::Parse("missing projects array".to_string()))?;
        let projects: Vec<ProjectRelevance> = raw
            .iter()
            .filter_map(|p| {
                Some(ProjectRelevance {
                    name: p.get("name")?.as_str()?.to_string(),
                    relevance_score: p.get("relevance_score").map(clamp_score)?,
                    reason: p
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
            })
            .collect();

        let score = project_score(&projects);
        state.project_analysis = Some(ProjectAnalysis {
            projects,
            project_score: score,
            summary: payload
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
        Ok(())
    }

    fn apply_default(&self, state: &mut DecisionState) {
        state.project_analysis.get_or_insert(ProjectAnalysis {
            projects: Vec::new(),
            project_score: 0,
            summary: "Project analysis unavailable".to_string(),
        });
    }
}

struct CollegeTierEvaluator {
    gateway: Arc<dyn ChatGateway>,
    search: Arc<dyn SearchProvider>,
    options: DecisionOptions,
}

#[async_trait]
impl Stage<DecisionState> for CollegeTierEvaluator {
    fn name(&self) -> &'static str {
        "college_tier"
    }

    fn is_satisfied(&self, state: &DecisionState) -> bool {
        state.college_tier.is_some()
    }

    async fn apply(&self, state: &mut DecisionState, run_id: Uuid) -> Result<(), StageError> {
        let Some(college) = state.input.college.clone().filter(|c| !c.is_empty()) else {
            state.college_tier = Some(CollegeTierInfo {
                tier: "Unknown".to_string(),
                notes: "No college on file".to_string(),
            });
            return Ok(());
        };

        let hits = self
            .search
            .search(&format!("{college} engineering ranking reputation"), 5)
            .await
            .unwrap_or_default();

        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::college_tier(&college, &hits),
            "decision.college_tier",
            self.options.call_timeout,
            run_id,
        )
        .await?;

        let tier = payload
            .get("tier")
            .and_then(Value::as_str)
            .ok_or_else(|| StageError::Parse("missing tier".to_string()))?;
        state.college_tier = Some(CollegeTierInfo {
            tier: tier.to_string(),
            notes: payload
                .get("notes")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
        Ok(())
    }

    fn apply_default(&self, state: &mut DecisionState) {
        state.college_tier.get_or_insert(CollegeTierInfo {
            tier: "Unknown".to_string(),
            notes: "Tier lookup unavailable".to_string(),
        });
    }
}

struct ExperienceEvaluator {
    gateway: Arc<dyn ChatGateway>,
    options: DecisionOptions,
}

#[async_trait]
impl Stage<DecisionState> for ExperienceEvaluator {
    fn name(&self) -> &'static str {
        "experience_eval"
    }

    fn is_satisfied(&self, state: &DecisionState) -> bool {
        state.experience_eval.is_some()
    }

    async fn apply(&self, state: &mut DecisionState, run_id: Uuid) -> Result<(), StageError> {
        let summary = crate::batch::profile_summary(&state.input.profile);
        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::experience_eval(
                &summary,
                &state.input.job_description,
                state.input.experience_years,
            ),
            "decision.experience",
            self.options.call_timeout,
            run_id,
        )
        .await?;

        let score = payload
            .get("score")
            .map(clamp_score)
            .ok_or_else(|| StageError::Parse("missing experience score".to_string()))?;
        state.experience_eval = Some(ExperienceEval {
            score,
            summary: payload
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
        Ok(())
    }

    fn apply_default(&self, state: &mut DecisionState) {
        state.experience_eval.get_or_insert(ExperienceEval {
            score: 0,
            summary: "Experience evaluation unavailable".to_string(),
        });
    }
}

fn parse_record(payload: &Value) -> Option<DecisionRecord> {
    let recommendation: DecisionLabel =
        serde_json::from_value(payload.get("recommendation")?.clone()).ok()?;
    let confidence = payload.get("confidence").map(clamp_score).unwrap_or(0);
    let list = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    Some(DecisionRecord {
        recommendation,
        confidence,
        reasoning: payload
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        key_factors: list("key_factors"),
        strengths: list("strengths"),
        concerns: list("concerns"),
        suggestion: payload
            .get("suggestion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

struct DecisionMaker {
    gateway: Arc<dyn ChatGateway>,
    options: DecisionOptions,
}

#[async_trait]
impl Stage<DecisionState> for DecisionMaker {
    fn name(&self) -> &'static str {
        "decision_maker"
    }

    fn is_satisfied(&self, state: &DecisionState) -> bool {
        state.decision.is_some()
    }

    async fn apply(&self, state: &mut DecisionState, run_id: Uuid) -> Result<(), StageError> {
        let analysis = state.analysis_json().to_string();
        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::final_decision(&analysis, &state.input.job_title, &state.input.company),
            "decision.final",
            self.options.call_timeout,
            run_id,
        )
        .await?;

        state.decision = Some(
            parse_record(&payload)
                .ok_or_else(|| StageError::Parse("unusable decision record".to_string()))?,
        );
        Ok(())
    }

    fn apply_default(&self, state: &mut DecisionState) {
        state.decision.get_or_insert_with(DecisionRecord::inconclusive);
    }
}

struct DecisionFallback {
    gateway: Arc<dyn ChatGateway>,
    options: DecisionOptions,
}

#[async_trait]
impl FallbackStage<DecisionState> for DecisionFallback {
    async fn apply(&self, state: &mut DecisionState, run_id: Uuid) -> Result<(), StageError> {
        let analysis = state.analysis_json().to_string();
        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::quick_decision(&analysis, &state.input.job_title),
            "decision.quick_fallback",
            Duration::from_secs(60),
            run_id,
        )
        .await?;
        state.decision = Some(
            parse_record(&payload)
                .ok_or_else(|| StageError::Parse("unusable decision record".to_string()))?,
        );
        self.fill_defaults(state);
        Ok(())
    }

    fn fill_defaults(&self, state: &mut DecisionState) {
        state.ats_analysis.get_or_insert(AtsAnalysis {
            score: 0,
            summary: "ATS analysis unavailable".to_string(),
            missing_keywords: Vec::new(),
        });
        state.project_analysis.get_or_insert(ProjectAnalysis {
            projects: Vec::new(),
            project_score: 0,
            summary: "Project analysis unavailable".to_string(),
        });
        state.college_tier.get_or_insert(CollegeTierInfo {
            tier: "Unknown".to_string(),
            notes: "Tier lookup unavailable".to_string(),
        });
        state.experience_eval.get_or_insert(ExperienceEval {
            score: 0,
            summary: "Experience evaluation unavailable".to_string(),
        });
        state.decision.get_or_insert_with(DecisionRecord::inconclusive);
    }
}

fn decision_engine(
    gateway: Arc<dyn ChatGateway>,
    search: Arc<dyn SearchProvider>,
    options: DecisionOptions,
) -> PipelineEngine<DecisionState> {
    let deadline = options.deadline;
    let stages: Vec<Box<dyn Stage<DecisionState>>> = vec![
        Box::new(AtsAnalyzer {
            gateway: Arc::clone(&gateway),
            options: options.clone(),
        }),
        Box::new(ProjectAnalyzer {
            gateway: Arc::clone(&gateway),
            options: options.clone(),
        }),
        Box::new(CollegeTierEvaluator {
            gateway: Arc::clone(&gateway),
            search,
            options: options.clone(),
        }),
        Box::new(ExperienceEvaluator {
            gateway: Arc::clone(&gateway),
            options: options.clone(),
        }),
        Box::new(DecisionMaker {
            gateway: Arc::clone(&gateway),
            options: options.clone(),
        }),
    ];
    PipelineEngine::new(
        "recruiter_decision",
        stages,
        Box::new(DecisionFallback { gateway, options }),
        deadline,
    )
}

/// Run the full decision pipeline and hand back the record plus the per-stage
/// analysis echo. Infallible; degraded runs surface through `status` and the
/// record's confidence.
pub async fn recommend(
    gateway: Arc<dyn ChatGateway>,
    search: Arc<dyn SearchProvider>,
    input: DecisionInput,
    options: DecisionOptions,
) -> DecisionOutcome {
    let run = decision_engine(gateway, search, options)
        .run(DecisionState::new(input))
        .await;
    let analysis = run.state.analysis_json();
    let record = run.state.decision.unwrap_or_else(DecisionRecord::inconclusive);
    DecisionOutcome {
        record,
        analysis,
        status: run.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(name: &str, score: u8) -> ProjectRelevance {
        ProjectRelevance {
            name: name.to_string(),
            relevance_score: score,
            reason: String::new(),
        }
    }

    #[test]
    fn project_score_mean_of_top_three() {
        let projects = vec![rel("a", 90), rel("b", 50), rel("c", 70), rel("d", 10)];
        // top three: 90, 70, 50
        assert_eq!(project_score(&projects), 70);
    }

    #[test]
    fn project_score_fewer_than_three() {
        assert_eq!(project_score(&[rel("a", 80)]), 80);
        assert_eq!(project_score(&[rel("a", 80), rel("b", 61)]), 71);
        assert_eq!(project_score(&[]), 0);
    }

    #[test]
    fn parse_record_clamps_confidence() {
        let payload = serde_json::json!({
            "recommendation": "Accept",
            "confidence": 250,
            "reasoning": "solid",
        });
        let record = parse_record(&payload).unwrap();
        assert_eq!(record.recommendation, DecisionLabel::Accept);
        assert_eq!(record.confidence, 100);
        assert!(record.key_factors.is_empty());
    }

    #[test]
    fn parse_record_rejects_unknown_label() {
        let payload = serde_json::json!({
            "recommendation": "Maybe",
            "confidence": 50,
        });
        assert!(parse_record(&payload).is_none());
    }
}
