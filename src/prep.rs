//! Interview-preparation pipeline.
//!
//! Four stages over a [`PrepState`]: company research (search-enriched),
//! rounds analysis, per-round preparation plans, and a static question
//! generator. When the run deadline expires the engine swaps in
//! [`QuickPrepFallback`], one oracle call that fills whatever is still unset.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::gateway::{Attribution, ChatGateway, ChatRequest};
use crate::pipeline::{FallbackStage, PipelineEngine, PipelineRun, Stage, StageError};
use crate::prompts;
use crate::repair::extract_json;
use crate::search::{SearchHit, SearchProvider};

/// Seniority band, detected from title and stated experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleLevel {
    Fresher,
    Sde1,
    Sde2,
    Senior,
}

impl RoleLevel {
    /// Title keywords win over years; years break the ties.
    pub fn detect(title: &str, experience_years: f32) -> Self {
        let lower = title.to_lowercase();
        if ["senior", "staff", "principal", "lead", "architect"]
            .iter()
            .any(|k| lower.contains(k))
        {
            return Self::Senior;
        }
        if lower.contains("fresher") || lower.contains("intern") || lower.contains("trainee") {
            return Self::Fresher;
        }
        if lower.contains("sde 2") || lower.contains("sde-2") || lower.contains("sde ii") {
            return Self::Sde2;
        }
        if experience_years >= 5.0 {
            Self::Senior
        } else if experience_years >= 2.5 {
            Self::Sde2
        } else if experience_years >= 1.0 {
            Self::Sde1
        } else {
            Self::Fresher
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresher => "Fresher",
            Self::Sde1 => "SDE-1",
            Self::Sde2 => "SDE-2",
            Self::Senior => "Senior",
        }
    }

    /// Only mid and senior candidates get the deep system-design track.
    pub fn needs_system_design(&self) -> bool {
        matches!(self, Self::Sde2 | Self::Senior)
    }

    pub fn difficulty_focus(&self) -> &'static str {
        match self {
            Self::Fresher => "easy problems, fundamentals and language basics",
            Self::Sde1 => "easy to medium problems, arrays, strings, hashmaps, trees",
            Self::Sde2 => "medium problems, graphs, dynamic programming, concurrency",
            Self::Senior => "medium to hard problems plus architecture trade-offs",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewRound {
    pub name: String,
    #[serde(default)]
    pub focus: String,
}

/// The accumulating run state. Input fields are set by the caller; each
/// `Option` output belongs to exactly one stage and is left untouched when
/// pre-supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepState {
    pub company: String,
    pub role: String,
    #[serde(default)]
    pub experience_years: f32,
    #[serde(default)]
    pub skills: Vec<String>,

    #[serde(default)]
    pub company_info: Option<String>,
    #[serde(default)]
    pub interview_links: Option<Vec<SearchHit>>,
    #[serde(default)]
    pub role_level: Option<RoleLevel>,
    #[serde(default)]
    pub interview_rounds: Option<Vec<InterviewRound>>,
    #[serde(default)]
    pub dsa_plan: Option<String>,
    #[serde(default)]
    pub system_design_plan: Option<String>,
    #[serde(default)]
    pub behavioral_plan: Option<String>,
    #[serde(default)]
    pub screening_questions: Option<Vec<String>>,
    #[serde(default)]
    pub questions_to_ask: Option<Vec<String>>,
}

impl PrepState {
    pub fn new(company: impl Into<String>, role: impl Into<String>, experience_years: f32) -> Self {
        Self {
            company: company.into(),
            role: role.into(),
            experience_years,
            skills: Vec::new(),
            company_info: None,
            interview_links: None,
            role_level: None,
            interview_rounds: None,
            dsa_plan: None,
            system_design_plan: None,
            behavioral_plan: None,
            screening_questions: None,
            questions_to_ask: None,
        }
    }

    fn level(&self) -> RoleLevel {
        self.role_level
            .unwrap_or_else(|| RoleLevel::detect(&self.role, self.experience_years))
    }

    /// True once every output key is set.
    pub fn is_complete(&self) -> bool {
        self.company_info.is_some()
            && self.interview_links.is_some()
            && self.role_level.is_some()
            && self.interview_rounds.is_some()
            && self.dsa_plan.is_some()
            && self.system_design_plan.is_some()
            && self.behavioral_plan.is_some()
            && self.screening_questions.is_some()
            && self.questions_to_ask.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct PrepOptions {
    pub model: String,
    pub deadline: Duration,
    pub call_timeout: Duration,
}

impl Default for PrepOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            deadline: Duration::from_secs(240),
            call_timeout: Duration::from_secs(120),
        }
    }
}

const MAX_INTERVIEW_LINKS: usize = 8;

/// Drop duplicate URLs, keep first occurrence, cap the list.
pub fn dedup_links(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(h.url.clone()))
        .take(MAX_INTERVIEW_LINKS)
        .collect()
}

const JUNIOR_DESIGN_GUIDANCE: &str = "\
System design is rarely a dedicated round at this level. Be ready to discuss \
the design of your own projects: why you chose your stack, how data flows, \
and what you would change at 10x load. Know the basics of REST, caching and \
SQL vs NoSQL trade-offs.";

fn fallback_rounds(level: RoleLevel) -> Vec<InterviewRound> {
    let mut rounds = vec![
        InterviewRound {
            name: "Online assessment".to_string(),
            focus: "DSA screening problems".to_string(),
        },
        InterviewRound {
            name: "Technical interview".to_string(),
            focus: "Coding and problem solving".to_string(),
        },
    ];
    if level.needs_system_design() {
        rounds.push(InterviewRound {
            name: "System design".to_string(),
            focus: "Architecture and trade-offs".to_string(),
        });
    }
    rounds.push(InterviewRound {
        name: "Hiring manager".to_string(),
        focus: "Behavioral and team fit".to_string(),
    });
    rounds
}

const SCREENING_QUESTIONS: [&str; 6] = [
    "Walk me through your most challenging project and your specific contribution.",
    "Why do you want to work at this company?",
    "What is your current notice period and compensation expectation?",
    "Describe a time you disagreed with a teammate and how it resolved.",
    "Which part of your stack do you know deeply enough to teach?",
    "Where do you want to grow in the next two years?",
];

const QUESTIONS_TO_ASK: [&str; 5] = [
    "How does the team decide what to build next?",
    "What does the onboarding and first 90 days look like?",
    "How is code review and deployment handled day to day?",
    "What separates a good engineer from a great one here?",
    "What is the team's biggest technical challenge right now?",
];

fn string_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
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

struct CompanyResearch {
    gateway: Arc<dyn ChatGateway>,
    search: Arc<dyn SearchProvider>,
    options: PrepOptions,
}

#[async_trait]
impl Stage<PrepState> for CompanyResearch {
    fn name(&self) -> &'static str {
        "company_research"
    }

    fn is_satisfied(&self, state: &PrepState) -> bool {
        state.company_info.is_some() && state.interview_links.is_some()
    }

    async fn apply(&self, state: &mut PrepState, run_id: Uuid) -> Result<(), StageError> {
        let query = format!("{} {} interview process experience", state.company, state.role);
        let hits = match self.search.search(&query, 12).await {
            Ok(hits) => dedup_links(hits),
            Err(e) => {
                debug!(error = %e, "search unavailable, researching without links");
                Vec::new()
            }
        };

        let messages = prompts::company_research(&state.company, &state.role, &hits);
        let request = ChatRequest::new(
            &self.options.model,
            messages,
            Attribution::for_run("prep.company_research", run_id),
        )
        .with_time_budget(self.options.call_timeout);
        let response = self.gateway.chat(request).await?;

        state.company_info = Some(response.content.trim().to_string());
        state.interview_links = Some(hits);
        Ok(())
    }

    fn apply_default(&self, state: &mut PrepState) {
        state
            .company_info
            .get_or_insert_with(|| format!("No research available for {}.", state.company));
        state.interview_links.get_or_insert_with(Vec::new);
    }
}

struct RoundsAnalyzer {
    gateway: Arc<dyn ChatGateway>,
    options: PrepOptions,
}

#[async_trait]
impl Stage<PrepState> for RoundsAnalyzer {
    fn name(&self) -> &'static str {
        "rounds_analyzer"
    }

    fn is_satisfied(&self, state: &PrepState) -> bool {
        state.role_level.is_some() && state.interview_rounds.is_some()
    }

    async fn apply(&self, state: &mut PrepState, run_id: Uuid) -> Result<(), StageError> {
        let level = state.level();
        // Level detection is pure; set it before the oracle call so a call
        // failure still leaves it filled.
        state.role_level = Some(level);

        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::rounds_analyzer(&state.company, &state.role, level),
            "prep.rounds_analyzer",
            self.options.call_timeout,
            run_id,
        )
        .await?;

        let rounds: Vec<InterviewRound> = payload
            .get("rounds")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| StageError::Parse("missing rounds array".to_string()))?;
        if rounds.is_empty() {
            return Err(StageError::Parse("empty rounds array".to_string()));
        }
        state.interview_rounds = Some(rounds);
        Ok(())
    }

    fn apply_default(&self, state: &mut PrepState) {
        let level = state.level();
        state.role_level.get_or_insert(level);
        state
            .interview_rounds
            .get_or_insert_with(|| fallback_rounds(level));
    }
}

struct RoundPrep {
    gateway: Arc<dyn ChatGateway>,
    options: PrepOptions,
}

#[async_trait]
impl Stage<PrepState> for RoundPrep {
    fn name(&self) -> &'static str {
        "round_prep"
    }

    fn is_satisfied(&self, state: &PrepState) -> bool {
        state.dsa_plan.is_some()
            && state.system_design_plan.is_some()
            && state.behavioral_plan.is_some()
    }

    async fn apply(&self, state: &mut PrepState, run_id: Uuid) -> Result<(), StageError> {
        let level = state.level();
        let rounds_json = state
            .interview_rounds
            .as_ref()
            .and_then(|r| serde_json::to_string(r).ok())
            .unwrap_or_else(|| "[]".to_string());

        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::round_prep(&state.company, &state.role, level, &rounds_json),
            "prep.round_prep",
            self.options.call_timeout,
            run_id,
        )
        .await?;

        let dsa = string_field(&payload, "dsa_plan")
            .ok_or_else(|| StageError::Parse("missing dsa_plan".to_string()))?;
        let behavioral = string_field(&payload, "behavioral_plan")
            .ok_or_else(|| StageError::Parse("missing behavioral_plan".to_string()))?;
        // Juniors get the static guidance block regardless of what the
        // oracle wrote.
        let design = if level.needs_system_design() {
            string_field(&payload, "system_design_plan")
                .ok_or_else(|| StageError::Parse("missing system_design_plan".to_string()))?
        } else {
            JUNIOR_DESIGN_GUIDANCE.to_string()
        };

        state.dsa_plan = Some(dsa);
        state.system_design_plan = Some(design);
        state.behavioral_plan = Some(behavioral);
        Ok(())
    }

    fn apply_default(&self, state: &mut PrepState) {
        let level = state.level();
        state
            .dsa_plan
            .get_or_insert_with(|| format!("Practice {}.", level.difficulty_focus()));
        state.system_design_plan.get_or_insert_with(|| {
            if level.needs_system_design() {
                "Review scalability basics: load balancing, caching, sharding, \
                 queues. Practice designing a URL shortener and a news feed."
                    .to_string()
            } else {
                JUNIOR_DESIGN_GUIDANCE.to_string()
            }
        });
        state.behavioral_plan.get_or_insert_with(|| {
            "Prepare STAR stories for conflict, failure, leadership and delivery."
                .to_string()
        });
    }
}

/// Terminal stage: static banks, no oracle call, cannot fail.
struct QuestionGenerator;

#[async_trait]
impl Stage<PrepState> for QuestionGenerator {
    fn name(&self) -> &'static str {
        "question_generator"
    }

    fn is_satisfied(&self, state: &PrepState) -> bool {
        state.screening_questions.is_some() && state.questions_to_ask.is_some()
    }

    async fn apply(&self, state: &mut PrepState, _run_id: Uuid) -> Result<(), StageError> {
        self.apply_default(state);
        Ok(())
    }

    fn apply_default(&self, state: &mut PrepState) {
        state
            .screening_questions
            .get_or_insert_with(|| SCREENING_QUESTIONS.iter().map(|s| s.to_string()).collect());
        state
            .questions_to_ask
            .get_or_insert_with(|| QUESTIONS_TO_ASK.iter().map(|s| s.to_string()).collect());
    }
}

/// One oracle call that fills every still-unset key, used on deadline expiry.
pub struct QuickPrepFallback {
    gateway: Arc<dyn ChatGateway>,
    options: PrepOptions,
}

#[async_trait]
impl FallbackStage<PrepState> for QuickPrepFallback {
    async fn apply(&self, state: &mut PrepState, run_id: Uuid) -> Result<(), StageError> {
        let level = state.level();
        let payload = oracle_json(
            &self.gateway,
            &self.options.model,
            prompts::quick_prep(&state.company, &state.role, level),
            "prep.quick_fallback",
            // Tighter budget: the run is already over its deadline.
            Duration::from_secs(60),
            run_id,
        )
        .await?;

        state.role_level.get_or_insert(level);
        if state.company_info.is_none() {
            state.company_info = string_field(&payload, "company_info");
        }
        if state.dsa_plan.is_none() {
            state.dsa_plan = string_field(&payload, "dsa_plan");
        }
        if state.system_design_plan.is_none() {
            state.system_design_plan = if level.needs_system_design() {
                string_field(&payload, "system_design_plan")
            } else {
                Some(JUNIOR_DESIGN_GUIDANCE.to_string())
            };
        }
        if state.behavioral_plan.is_none() {
            state.behavioral_plan = string_field(&payload, "behavioral_plan");
        }
        self.fill_defaults(state);
        Ok(())
    }

    fn fill_defaults(&self, state: &mut PrepState) {
        let level = state.level();
        state.role_level.get_or_insert(level);
        state
            .company_info
            .get_or_insert_with(|| format!("No research available for {}.", state.company));
        state.interview_links.get_or_insert_with(Vec::new);
        state
            .interview_rounds
            .get_or_insert_with(|| fallback_rounds(level));
        state
            .dsa_plan
            .get_or_insert_with(|| format!("Practice {}.", level.difficulty_focus()));
        state.system_design_plan.get_or_insert_with(|| {
            if level.needs_system_design() {
                "Review scalability basics and practice two design problems.".to_string()
            } else {
                JUNIOR_DESIGN_GUIDANCE.to_string()
            }
        });
        state.behavioral_plan.get_or_insert_with(|| {
            "Prepare STAR stories for conflict, failure, leadership and delivery."
                .to_string()
        });
        state
            .screening_questions
            .get_or_insert_with(|| SCREENING_QUESTIONS.iter().map(|s| s.to_string()).collect());
        state
            .questions_to_ask
            .get_or_insert_with(|| QUESTIONS_TO_ASK.iter().map(|s| s.to_string()).collect());
    }
}

/// Build the prep engine. Exposed separately so tests can tune the deadline.
pub fn prep_engine(
    gateway: Arc<dyn ChatGateway>,
    search: Arc<dyn SearchProvider>,
    options: PrepOptions,
) -> PipelineEngine<PrepState> {
    let deadline = options.deadline;
    let stages: Vec<Box<dyn Stage<PrepState>>> = vec![
        Box::new(CompanyResearch {
            gateway: Arc::clone(&gateway),
            search,
            options: options.clone(),
        }),
        Box::new(RoundsAnalyzer {
            gateway: Arc::clone(&gateway),
            options: options.clone(),
        }),
        Box::new(RoundPrep {
            gateway: Arc::clone(&gateway),
            options: options.clone(),
        }),
        Box::new(QuestionGenerator),
    ];
    PipelineEngine::new(
        "interview_prep",
        stages,
        Box::new(QuickPrepFallback { gateway, options }),
        deadline,
    )
}

/// Run the full interview-prep pipeline. Always returns a complete state.
pub async fn prepare_interview(
    gateway: Arc<dyn ChatGateway>,
    search: Arc<dyn SearchProvider>,
    state: PrepState,
    options: PrepOptions,
) -> PipelineRun<PrepState> {
    prep_engine(gateway, search, options).run(state).await
}
